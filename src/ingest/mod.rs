// src/ingest/mod.rs
//! Source collection: collaborator contracts plus the concrete feeds, search and
//! extraction clients the probe binary wires together.
pub mod config;
pub mod extract;
pub mod providers;
pub mod search;
pub mod types;

use crate::ingest::types::{FeedProvider, FeedStatus, FetchOptions, FetchOutcome, SourceFetcher};
use crate::source::{normalize_url, SourceArticle};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_articles_total", "Articles returned by feeds.");
        describe_counter!(
            "ingest_dedup_total",
            "Articles removed as duplicate URLs across feeds."
        );
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("ingest_fetch_ms", "Multi-feed fetch time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cut to at most `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

/// True when any keyword occurs in the title or snippet (case-insensitive).
/// An empty keyword list keeps everything.
pub fn matches_any_keyword(article: &SourceArticle, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let hay = format!(
        "{} {}",
        article.title.to_lowercase(),
        article.snippet.as_deref().unwrap_or_default().to_lowercase()
    );
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| hay.contains(&k))
}

/// Drop later articles whose normalised URL was already seen. Returns (kept, dropped).
pub fn dedup_by_url(articles: Vec<SourceArticle>) -> (Vec<SourceArticle>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(articles.len());
    let mut dropped = 0usize;
    for a in articles {
        let key = normalize_url(&a.url);
        if key.is_empty() || !seen.insert(key) {
            dropped += 1;
            continue;
        }
        kept.push(a);
    }
    (kept, dropped)
}

/// Fans out to every feed with an all-settled join; one feed failing never
/// aborts the others. Articles keep feed order, then are URL-deduplicated and
/// capped at `opts.limit` (0 = no cap).
pub struct MultiFeedFetcher {
    providers: Vec<Box<dyn FeedProvider>>,
}

impl MultiFeedFetcher {
    pub fn new(providers: Vec<Box<dyn FeedProvider>>) -> Self {
        Self { providers }
    }

    pub fn feed_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait::async_trait]
impl SourceFetcher for MultiFeedFetcher {
    async fn fetch_all_sources(&self, opts: &FetchOptions) -> anyhow::Result<FetchOutcome> {
        ensure_metrics_described();
        let t0 = std::time::Instant::now();

        let settled = join_all(self.providers.iter().map(|p| p.fetch(opts))).await;

        let mut raw = Vec::new();
        let mut per_feed_status = Vec::with_capacity(settled.len());
        for (p, res) in self.providers.iter().zip(settled) {
            match res {
                Ok(mut v) => {
                    per_feed_status.push(FeedStatus {
                        feed: p.name().to_string(),
                        ok: true,
                        count: v.len(),
                        error: None,
                    });
                    raw.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, feed = p.name(), "feed error");
                    counter!("ingest_feed_errors_total").increment(1);
                    per_feed_status.push(FeedStatus {
                        feed: p.name().to_string(),
                        ok: false,
                        count: 0,
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }

        let (mut articles, dropped) = dedup_by_url(raw);
        if opts.limit > 0 {
            articles.truncate(opts.limit);
        }

        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_articles_total").increment(articles.len() as u64);
        counter!("ingest_dedup_total").increment(dropped as u64);

        Ok(FetchOutcome {
            total_count: articles.len(),
            articles,
            per_feed_status,
        })
    }
}
