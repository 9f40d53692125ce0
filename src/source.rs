// src/source.rs
//! Source articles as produced by the fetch collaborator, plus their extracted form.

use serde::{Deserialize, Serialize};

/// Raw article metadata from one of the content feeds. `url` is the unique key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceArticle {
    pub title: String,
    pub url: String,
    /// Feed the article came from, e.g. "hackernews", "reddit/r/rust", "web_search".
    pub origin_feed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl SourceArticle {
    pub fn new(title: impl Into<String>, url: impl Into<String>, origin_feed: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            origin_feed: origin_feed.into(),
            snippet: None,
            author: None,
            date: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// A source article after a full-text extraction attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedArticle {
    #[serde(flatten)]
    pub article: SourceArticle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub extraction_success: bool,
}

impl ExtractedArticle {
    pub fn title(&self) -> &str {
        &self.article.title
    }

    pub fn url(&self) -> &str {
        &self.article.url
    }

    pub fn origin_feed(&self) -> &str {
        &self.article.origin_feed
    }

    /// Full text when extraction produced some, otherwise the feed snippet, otherwise "".
    pub fn body(&self) -> &str {
        self.content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(self.article.snippet.as_deref())
            .unwrap_or("")
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self.extraction_success = true;
        self
    }
}

impl From<SourceArticle> for ExtractedArticle {
    /// Wrap an article that was never extracted (body falls back to the snippet).
    fn from(article: SourceArticle) -> Self {
        Self {
            article,
            content: None,
            extraction_success: false,
        }
    }
}

/// Canonical form for URL comparison: trimmed, lowercase, no trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Normalised equality, tolerant of one URL containing the other
/// (scheme or query-string differences).
pub fn urls_match(a: &str, b: &str) -> bool {
    let a = normalize_url(a);
    let b = normalize_url(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_matching_is_normalised_and_substring_tolerant() {
        assert!(urls_match("https://X.test/Post/", "https://x.test/post"));
        assert!(urls_match("x.test/post", "https://x.test/post?ref=rss"));
        assert!(!urls_match("https://x.test/a", "https://x.test/b"));
        assert!(!urls_match("", "https://x.test/b"));
    }

    #[test]
    fn body_prefers_content_then_snippet() {
        let a = SourceArticle::new("T", "https://x.test/a", "rss").with_snippet("snip");
        let bare: ExtractedArticle = a.clone().into();
        assert_eq!(bare.body(), "snip");
        assert!(!bare.extraction_success);

        let full = ExtractedArticle::from(a).with_content("full text");
        assert_eq!(full.body(), "full text");
        assert!(full.extraction_success);
    }

    #[test]
    fn blank_content_falls_back_to_snippet() {
        let mut e: ExtractedArticle = SourceArticle::new("T", "u", "rss").with_snippet("s").into();
        e.content = Some("   ".into());
        assert_eq!(e.body(), "s");
    }
}
