// src/ingest/types.rs
//! Collaborator contracts consumed by the grounding core.
use crate::source::{ExtractedArticle, SourceArticle};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Free-text web search. "No results" is signalled in the text, not as an error.
#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Options for a multi-feed fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOptions {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub limit: usize,
}

/// Outcome of one feed inside a multi-feed fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedStatus {
    pub feed: String,
    pub ok: bool,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub articles: Vec<SourceArticle>,
    pub per_feed_status: Vec<FeedStatus>,
    pub total_count: usize,
}

/// Multi-source article fetcher. Must tolerate individual feed failures.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_all_sources(&self, opts: &FetchOptions) -> Result<FetchOutcome>;
}

/// One content feed (RSS, Reddit, ...).
#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch(&self, opts: &FetchOptions) -> Result<Vec<SourceArticle>>;
    fn name(&self) -> &str;
}

/// Result of a single full-text extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Extraction {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            content: None,
            title: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub max_articles: usize,
    pub max_content_length: usize,
    pub delay_ms: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_articles: 10,
            max_content_length: 5_000,
            delay_ms: 200,
        }
    }
}

/// Full-text extractor.
#[async_trait::async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Extraction;

    /// Extract the first `max_articles` sequentially with a courtesy delay; the rest pass
    /// through untouched. Output order matches input order and every input is returned.
    async fn extract_batch(
        &self,
        articles: Vec<SourceArticle>,
        opts: &ExtractOptions,
    ) -> Vec<ExtractedArticle> {
        let mut out = Vec::with_capacity(articles.len());
        for (i, article) in articles.into_iter().enumerate() {
            if i >= opts.max_articles {
                out.push(ExtractedArticle::from(article));
                continue;
            }
            if i > 0 && opts.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(opts.delay_ms)).await;
            }
            let ex = self.extract(&article.url).await;
            out.push(apply_extraction(article, ex, opts.max_content_length));
        }
        out
    }
}

/// Merge an extraction attempt into its article; failures keep the snippet as body.
pub fn apply_extraction(
    article: SourceArticle,
    ex: Extraction,
    max_content_length: usize,
) -> ExtractedArticle {
    let success = ex.success;
    match ex.content.filter(|c| success && !c.trim().is_empty()) {
        Some(content) => {
            let content = if content.chars().count() > max_content_length {
                content.chars().take(max_content_length).collect()
            } else {
                content
            };
            ExtractedArticle::from(article).with_content(content)
        }
        None => ExtractedArticle::from(article),
    }
}
