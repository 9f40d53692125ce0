// src/ingest/config.rs
//! Feed list: which RSS feeds and which Reddit settings the multi-feed fetcher uses.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::providers::{RedditProvider, RssFeedProvider};
use crate::ingest::providers::reddit::SUBREDDIT_DELAY_MS;
use crate::ingest::types::FeedProvider;
use crate::ingest::MultiFeedFetcher;

pub const ENV_FEEDS_PATH: &str = "GROUNDING_FEEDS_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssFeedCfg {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCfg {
    pub enabled: bool,
    /// Used when a request names no subreddits.
    pub subreddits: Vec<String>,
    pub delay_ms: u64,
    pub per_subreddit_limit: usize,
}

impl Default for RedditCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            subreddits: Vec::new(),
            delay_ms: SUBREDDIT_DELAY_MS,
            per_subreddit_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub rss: Vec<RssFeedCfg>,
    #[serde(default)]
    pub reddit: RedditCfg,
}

/// Load feeds from an explicit path. Supports TOML or JSON formats.
pub fn load_feeds_from(path: &Path) -> Result<FeedsConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Load feeds using env var + fallbacks:
/// 1) $GROUNDING_FEEDS_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
///
/// No file at all yields an empty config.
pub fn load_feeds_default() -> Result<FeedsConfig> {
    if let Ok(p) = std::env::var(ENV_FEEDS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        } else {
            return Err(anyhow!("{ENV_FEEDS_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(FeedsConfig::default())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<FeedsConfig> {
    let parsed = if hint_ext == "json" {
        serde_json::from_str::<FeedsConfig>(s).context("parsing feeds json")?
    } else if hint_ext == "toml" {
        toml::from_str::<FeedsConfig>(s).context("parsing feeds toml")?
    } else if let Ok(v) = toml::from_str::<FeedsConfig>(s) {
        v
    } else {
        serde_json::from_str::<FeedsConfig>(s)
            .map_err(|_| anyhow!("unsupported feeds format"))?
    };
    Ok(clean(parsed))
}

/// Trim names/urls, drop feeds without a url, keep the first feed per name.
fn clean(mut cfg: FeedsConfig) -> FeedsConfig {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    cfg.rss = cfg
        .rss
        .into_iter()
        .map(|f| RssFeedCfg {
            name: f.name.trim().to_string(),
            url: f.url.trim().to_string(),
            category: f.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        })
        .filter(|f| !f.url.is_empty() && !f.name.is_empty())
        .filter(|f| seen.insert(f.name.to_ascii_lowercase()))
        .collect();
    cfg.reddit.subreddits = cfg
        .reddit
        .subreddits
        .into_iter()
        .map(|s| s.trim().trim_start_matches("r/").to_string())
        .filter(|s| !s.is_empty())
        .collect();
    cfg
}

/// Build the multi-feed fetcher described by `cfg`, sharing one HTTP client.
pub fn build_fetcher(cfg: &FeedsConfig, client: reqwest::Client) -> MultiFeedFetcher {
    let mut providers: Vec<Box<dyn FeedProvider>> = Vec::new();
    for f in &cfg.rss {
        let mut p = RssFeedProvider::from_url(&f.name, &f.url, client.clone());
        if let Some(c) = &f.category {
            p = p.with_category(c.clone());
        }
        providers.push(Box::new(p));
    }
    if cfg.reddit.enabled {
        providers.push(Box::new(
            RedditProvider::new(client)
                .with_default_subreddits(cfg.reddit.subreddits.clone())
                .with_delay_ms(cfg.reddit.delay_ms)
                .with_limit(cfg.reddit.per_subreddit_limit),
        ));
    }
    MultiFeedFetcher::new(providers)
}
