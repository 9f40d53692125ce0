// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::ingest::types::{FeedProvider, FetchOptions};
use crate::ingest::{matches_any_keyword, normalize_text, truncate_chars};
use crate::source::SourceArticle;

const SNIPPET_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "dc:creator", alias = "author")]
    author: Option<String>,
}

/// RFC 2822 `pubDate` -> RFC 3339 UTC string; unparseable dates are dropped.
fn rfc2822_to_rfc3339(ts: &str) -> Option<String> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

/// One RSS 2.0 feed, optionally tagged with a category.
pub struct RssFeedProvider {
    name: String,
    category: Option<String>,
    mode: Mode,
}

enum Mode {
    // Own copy so tests don't need a 'static fixture.
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedProvider {
    pub fn from_fixture_str(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            category: None,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            category: None,
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// A categorised feed is skipped when the request names categories and this one is not among them.
    fn wanted(&self, opts: &FetchOptions) -> bool {
        match &self.category {
            Some(c) if !opts.categories.is_empty() => {
                opts.categories.iter().any(|w| w.eq_ignore_ascii_case(c))
            }
            _ => true,
        }
    }

    pub fn parse_items_from_str(&self, s: &str) -> Result<Vec<SourceArticle>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .with_context(|| format!("parsing rss xml for feed {}", self.name))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let Some(url) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
                continue;
            };
            if title.is_empty() {
                continue;
            }
            let snippet = it
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|d| !d.is_empty())
                .map(|d| truncate_chars(&d, SNIPPET_MAX_CHARS));

            out.push(SourceArticle {
                title,
                url,
                origin_feed: self.name.clone(),
                snippet,
                author: it.author.map(|a| normalize_text(&a)).filter(|a| !a.is_empty()),
                date: it.pub_date.as_deref().and_then(rfc2822_to_rfc3339),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl FeedProvider for RssFeedProvider {
    async fn fetch(&self, opts: &FetchOptions) -> Result<Vec<SourceArticle>> {
        if !self.wanted(opts) {
            return Ok(Vec::new());
        }
        let items = match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s)?,
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("{} http get()", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items_from_str(&body)?
            }
        };
        Ok(items
            .into_iter()
            .filter(|a| matches_any_keyword(a, &opts.keywords))
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
