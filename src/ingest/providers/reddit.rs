// src/ingest/providers/reddit.rs
//! Reddit listing feed: one request per subreddit, sequential, with a courtesy delay.
//! A subreddit that fails is skipped; the provider only errors when every subreddit failed.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{FeedProvider, FetchOptions};
use crate::ingest::{normalize_text, truncate_chars};
use crate::source::SourceArticle;

pub const SUBREDDIT_DELAY_MS: u64 = 200;
const SNIPPET_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}
#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}
#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}
#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    stickied: bool,
}

/// Parse a `/r/<sub>/top.json` listing into articles tagged `reddit/r/<sub>`.
pub fn parse_listing(subreddit: &str, json: &str) -> Result<Vec<SourceArticle>> {
    let listing: Listing =
        serde_json::from_str(json).with_context(|| format!("parsing r/{subreddit} listing"))?;
    let feed = format!("reddit/r/{subreddit}");
    let mut out = Vec::new();
    for child in listing.data.children {
        let post = child.data;
        if post.stickied {
            continue;
        }
        let title = normalize_text(&post.title);
        // Link posts carry the external URL; self posts fall back to the permalink.
        let url = post
            .url
            .filter(|u| u.starts_with("http"))
            .or_else(|| post.permalink.map(|p| format!("https://www.reddit.com{p}")));
        let Some(url) = url else { continue };
        if title.is_empty() {
            continue;
        }
        let snippet = post
            .selftext
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty())
            .map(|s| truncate_chars(&s, SNIPPET_MAX_CHARS));
        let date = post
            .created_utc
            .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
            .map(|dt| dt.to_rfc3339());
        out.push(SourceArticle {
            title,
            url,
            origin_feed: feed.clone(),
            snippet,
            author: post.author,
            date,
        });
    }
    Ok(out)
}

pub struct RedditProvider {
    client: reqwest::Client,
    base_url: String,
    default_subreddits: Vec<String>,
    per_subreddit_limit: usize,
    delay: Duration,
}

impl RedditProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: "https://www.reddit.com".to_string(),
            default_subreddits: Vec::new(),
            per_subreddit_limit: 10,
            delay: Duration::from_millis(SUBREDDIT_DELAY_MS),
        }
    }

    pub fn with_default_subreddits(mut self, subs: Vec<String>) -> Self {
        self.default_subreddits = subs;
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.per_subreddit_limit = limit.max(1);
        self
    }

    async fn fetch_subreddit(&self, sub: &str) -> Result<Vec<SourceArticle>> {
        let url = format!(
            "{}/r/{}/top.json?t=week&limit={}",
            self.base_url.trim_end_matches('/'),
            sub,
            self.per_subreddit_limit
        );
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("reddit r/{sub} get()"))?
            .text()
            .await
            .with_context(|| format!("reddit r/{sub} .text()"))?;
        parse_listing(sub, &body)
    }
}

#[async_trait]
impl FeedProvider for RedditProvider {
    async fn fetch(&self, opts: &FetchOptions) -> Result<Vec<SourceArticle>> {
        let subs = if opts.subreddits.is_empty() {
            &self.default_subreddits
        } else {
            &opts.subreddits
        };
        if subs.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut failures = 0usize;
        for (i, sub) in subs.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let sub = sub.trim().trim_start_matches("r/");
            match self.fetch_subreddit(sub).await {
                Ok(mut v) => out.append(&mut v),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(target: "ingest", error = ?e, subreddit = sub, "subreddit fetch failed");
                }
            }
        }
        if failures == subs.len() {
            return Err(anyhow!("all {failures} subreddit fetches failed"));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "reddit"
    }
}
