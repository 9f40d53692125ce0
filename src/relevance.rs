// src/relevance.rs
//! Keyword-overlap relevance between a topic and a source.
//!
//! score = title_weight * (title hits / keywords)
//!       + min(body_weight * (body hits / keywords), body_weight)
//!       + url_weight * (url hits / keywords)
//! clamped to [0, 1]. Pure and deterministic.

use crate::keywords::extract_keywords;
use crate::source::{ExtractedArticle, SourceArticle};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE_WEIGHT: f32 = 0.5;
pub const DEFAULT_BODY_WEIGHT: f32 = 0.3;
pub const DEFAULT_URL_WEIGHT: f32 = 0.2;

/// Anything that exposes the three text surfaces the scorer looks at.
pub trait Scorable {
    fn title(&self) -> &str;
    fn body(&self) -> &str;
    fn url(&self) -> &str;
}

impl Scorable for SourceArticle {
    fn title(&self) -> &str {
        &self.title
    }
    fn body(&self) -> &str {
        self.snippet.as_deref().unwrap_or("")
    }
    fn url(&self) -> &str {
        &self.url
    }
}

impl Scorable for ExtractedArticle {
    fn title(&self) -> &str {
        ExtractedArticle::title(self)
    }
    fn body(&self) -> &str {
        ExtractedArticle::body(self)
    }
    fn url(&self) -> &str {
        ExtractedArticle::url(self)
    }
}

/// Weights for the three surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub title: f32,
    pub body: f32,
    pub url: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_WEIGHT,
            body: DEFAULT_BODY_WEIGHT,
            url: DEFAULT_URL_WEIGHT,
        }
    }
}

impl ScoringWeights {
    /// Safe constructor with clamping.
    pub fn new(title: f32, body: f32, url: f32) -> Self {
        fn c(x: f32) -> f32 {
            if x.is_finite() {
                x.clamp(0.0, 1.0)
            } else {
                0.0
            }
        }
        Self {
            title: c(title),
            body: c(body),
            url: c(url),
        }
    }
}

/// Breakdown of a single evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Relevance {
    pub score: f32,
    pub keywords: usize,
    pub title_hits: usize,
    pub body_hits: usize,
    pub url_hits: usize,
}

/// Score with the default weights.
pub fn calculate_relevance_score<S: Scorable + ?Sized>(topic: &str, source: &S) -> f32 {
    score_breakdown(topic, source, &ScoringWeights::default()).score
}

/// Score with explicit weights.
pub fn calculate_relevance_score_with<S: Scorable + ?Sized>(
    topic: &str,
    source: &S,
    weights: &ScoringWeights,
) -> f32 {
    score_breakdown(topic, source, weights).score
}

/// Full breakdown; zero keywords means a zero score.
pub fn score_breakdown<S: Scorable + ?Sized>(
    topic: &str,
    source: &S,
    weights: &ScoringWeights,
) -> Relevance {
    let keywords = extract_keywords(topic);
    if keywords.is_empty() {
        return Relevance::default();
    }

    let title = source.title().to_lowercase();
    let body = source.body().to_lowercase();
    let url = source.url().to_lowercase();

    let hits = |hay: &str| keywords.iter().filter(|k| hay.contains(k.as_str())).count();
    let title_hits = hits(&title);
    let body_hits = hits(&body);
    let url_hits = hits(&url);

    let n = keywords.len() as f32;
    let title_part = (title_hits as f32 / n) * weights.title;
    let body_part = ((body_hits as f32 / n) * weights.body).min(weights.body);
    let url_part = (url_hits as f32 / n) * weights.url;

    Relevance {
        score: (title_part + body_part + url_part).clamp(0.0, 1.0),
        keywords: keywords.len(),
        title_hits,
        body_hits,
        url_hits,
    }
}

/// Highest score of `source` against any of `topics` (0.0 for an empty set).
pub fn best_score_against<'a, S, I>(topics: I, source: &S, weights: &ScoringWeights) -> f32
where
    S: Scorable + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    topics
        .into_iter()
        .map(|t| calculate_relevance_score_with(t, source, weights))
        .fold(0.0f32, f32::max)
}
