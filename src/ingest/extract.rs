// src/ingest/extract.rs
//! Full-text extraction over plain HTTP: fetch HTML, drop scripts/styles/navigation,
//! keep paragraph text.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

use crate::ingest::types::{ArticleExtractor, Extraction};
use crate::ingest::{normalize_text, truncate_chars};

/// Less body text than this is treated as a failed extraction (paywall, JS-only page).
pub const MIN_CONTENT_CHARS: usize = 200;
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 20_000;

fn re_noise() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript|nav|header|footer|aside|form)\b[^>]*>.*?</(script|style|noscript|nav|header|footer|aside|form)>").unwrap()
    })
}

fn re_title() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

fn re_paragraph() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap())
}

/// Pure HTML -> `Extraction`. Paragraphs are joined with blank lines.
pub fn extract_from_html(html: &str, max_chars: usize) -> Extraction {
    let title = re_title()
        .captures(html)
        .map(|c| normalize_text(&c[1]))
        .filter(|t| !t.is_empty());

    let cleaned = re_noise().replace_all(html, " ");
    let paragraphs: Vec<String> = re_paragraph()
        .captures_iter(&cleaned)
        .map(|c| normalize_text(&c[1]))
        .filter(|p| p.split_whitespace().count() >= 5)
        .collect();
    let content = paragraphs.join("\n\n");

    if content.chars().count() < MIN_CONTENT_CHARS {
        return Extraction {
            content: None,
            title,
            success: false,
            error: Some(format!(
                "extracted {} chars, below minimum {}",
                content.chars().count(),
                MIN_CONTENT_CHARS
            )),
        };
    }

    Extraction {
        content: Some(truncate_chars(&content, max_chars)),
        title,
        success: true,
        error: None,
    }
}

pub struct HttpExtractor {
    http: reqwest::Client,
    max_chars: usize,
}

impl HttpExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; topic-grounding/0.1)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            max_chars: DEFAULT_MAX_CONTENT_CHARS,
        })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait::async_trait]
impl ArticleExtractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Extraction {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Extraction::failed(format!("request failed: {e}")),
        };
        if !resp.status().is_success() {
            return Extraction::failed(format!("http status {}", resp.status()));
        }
        match resp.text().await {
            Ok(html) => extract_from_html(&html, self.max_chars),
            Err(e) => Extraction::failed(format!("reading body failed: {e}")),
        }
    }
}
