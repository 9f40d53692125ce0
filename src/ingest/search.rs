// src/ingest/search.rs
//! Web search: the text contract shared by all search providers, and a Brave Search client.
//!
//! Text contract:
//! ```text
//! 1. **Title** (https://example.com/a)
//!    snippet line
//! 2. **Other** (https://example.com/b)
//! ```
//! An empty result set is rendered as `No results found for "<query>"`.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::normalize_text;
use crate::ingest::types::WebSearch;
use crate::source::SourceArticle;

pub const WEB_SEARCH_FEED: &str = "web_search";

/// One parsed search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

impl SearchHit {
    pub fn into_article(self) -> SourceArticle {
        SourceArticle {
            title: self.title,
            url: self.url,
            origin_feed: WEB_SEARCH_FEED.to_string(),
            snippet: self.snippet,
            author: None,
            date: None,
        }
    }
}

/// Render hits into the enumerated text contract.
pub fn format_search_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for \"{query}\"");
    }
    let mut out = String::new();
    for (i, h) in hits.iter().enumerate() {
        out.push_str(&format!("{}. **{}** ({})\n", i + 1, h.title, h.url));
        if let Some(s) = h.snippet.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("   {s}\n"));
        }
    }
    out
}

/// Parse enumerated `N. **Title** (URL)` blocks; continuation lines become the snippet.
/// When no enumerated block is present, bare URLs are returned with the URL as title.
pub fn parse_search_hits(raw: &str) -> Vec<SearchHit> {
    static RE_ITEM: OnceCell<Regex> = OnceCell::new();
    static RE_URL: OnceCell<Regex> = OnceCell::new();
    let re_item = RE_ITEM.get_or_init(|| {
        Regex::new(r"^\s*\d+\.\s+\*\*(?P<title>.+?)\*\*\s*\((?P<url>https?://[^\s)]+)\)").unwrap()
    });
    let re_url = RE_URL.get_or_init(|| Regex::new(r#"https?://[^\s)\]"'<>]+"#).unwrap());

    let mut hits: Vec<SearchHit> = Vec::new();
    for line in raw.lines() {
        if let Some(caps) = re_item.captures(line) {
            hits.push(SearchHit {
                title: caps["title"].trim().to_string(),
                url: caps["url"].trim_end_matches(['.', ',']).to_string(),
                snippet: None,
            });
            continue;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(last) = hits.last_mut() {
            let snippet = last.snippet.get_or_insert_with(String::new);
            if !snippet.is_empty() {
                snippet.push(' ');
            }
            snippet.push_str(text);
        }
    }
    if !hits.is_empty() {
        return hits;
    }

    re_url
        .find_iter(raw)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
        .map(|url| SearchHit {
            title: url.clone(),
            url,
            snippet: None,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}
#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}
#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

/// Brave Search API client. Requires an API key (`BRAVE_API_KEY` in the probe binary).
pub struct BraveWebSearch {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    count: usize,
}

impl BraveWebSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("topic-grounding/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building search http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
            count: 10,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.clamp(1, 20);
        self
    }
}

#[async_trait::async_trait]
impl WebSearch for BraveWebSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let count = self.count.to_string();
        let resp: BraveResponse = self
            .http
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("brave search request")?
            .json()
            .await
            .context("brave search response")?;

        let hits: Vec<SearchHit> = resp
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: normalize_text(&r.title),
                url: r.url,
                snippet: r
                    .description
                    .as_deref()
                    .map(normalize_text)
                    .filter(|d| !d.is_empty()),
            })
            .collect();
        Ok(format_search_hits(query, &hits))
    }

    fn name(&self) -> &'static str {
        "brave"
    }
}
