// src/matcher.rs
//! Topic -> source matching.
//!
//! Per topic:
//! - declared resource URL found in the pool: that source is the primary source
//!   (score 1.0, first), followed by up to `max_secondary_with_primary` keyword matches;
//! - otherwise (or when the URL is missing from the pool): every source is scored,
//!   those at or above `match_threshold` are kept, best first, capped at `max_matches`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write as _;

use crate::relevance::{calculate_relevance_score_with, ScoringWeights};
use crate::source::{urls_match, ExtractedArticle};
use crate::topic::Topic;

pub const MATCH_THRESHOLD: f32 = 0.3;
pub const DEFAULT_MAX_MATCHES: usize = 5;
pub const DEFAULT_MAX_SECONDARY_WITH_PRIMARY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub match_threshold: f32,
    pub max_matches: usize,
    pub max_secondary_with_primary: usize,
    pub weights: ScoringWeights,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_THRESHOLD,
            max_matches: DEFAULT_MAX_MATCHES,
            max_secondary_with_primary: DEFAULT_MAX_SECONDARY_WITH_PRIMARY,
            weights: ScoringWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSource {
    pub article: ExtractedArticle,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSourceMapping {
    pub topic: Topic,
    /// Best first; a primary source, when present, is always element 0.
    pub matched_sources: Vec<ScoredSource>,
    pub relevance_score: f32,
    pub has_match: bool,
    /// Declared resource URL, whether or not it was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_source: Option<ExtractedArticle>,
}

impl TopicSourceMapping {
    /// A resource URL was declared but not present in the pool.
    pub fn primary_source_missing(&self) -> bool {
        self.primary_source_url.is_some() && self.primary_source.is_none()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.matched_sources.iter().map(|s| s.article.url())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingResult {
    pub mappings: Vec<TopicSourceMapping>,
    pub unmatched_topics: Vec<String>,
    pub matched_count: usize,
}

/// Score all sources, keep those >= threshold, best first (ties keep pool order).
pub fn rank_sources(
    topic: &str,
    sources: &[ExtractedArticle],
    cfg: &MatcherConfig,
) -> Vec<ScoredSource> {
    let mut scored: Vec<ScoredSource> = sources
        .iter()
        .map(|a| ScoredSource {
            score: calculate_relevance_score_with(topic, a, &cfg.weights),
            article: a.clone(),
        })
        .filter(|s| s.score >= cfg.match_threshold)
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored
}

/// Match one topic against the pool.
pub fn match_single_topic(
    topic: &Topic,
    sources: &[ExtractedArticle],
    cfg: &MatcherConfig,
) -> TopicSourceMapping {
    let declared = topic
        .resource
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    if let Some(url) = &declared {
        if let Some(primary) = sources.iter().find(|a| urls_match(a.url(), url)) {
            let mut matched = vec![ScoredSource {
                article: primary.clone(),
                score: 1.0,
            }];
            matched.extend(
                rank_sources(&topic.title, sources, cfg)
                    .into_iter()
                    .filter(|s| s.article.url() != primary.url())
                    .take(cfg.max_secondary_with_primary),
            );
            return TopicSourceMapping {
                topic: topic.clone(),
                matched_sources: matched,
                relevance_score: 1.0,
                has_match: true,
                primary_source_url: declared.clone(),
                primary_source: Some(primary.clone()),
            };
        }
    }

    let mut matched = rank_sources(&topic.title, sources, cfg);
    matched.truncate(cfg.max_matches);
    let relevance_score = matched.first().map(|s| s.score).unwrap_or(0.0);
    TopicSourceMapping {
        topic: topic.clone(),
        has_match: !matched.is_empty(),
        matched_sources: matched,
        relevance_score,
        primary_source_url: declared,
        primary_source: None,
    }
}

/// Match every topic; mappings follow topic order.
pub fn match_topics_to_sources(
    topics: &[Topic],
    sources: &[ExtractedArticle],
    cfg: &MatcherConfig,
) -> MatchingResult {
    let mappings: Vec<TopicSourceMapping> = topics
        .iter()
        .map(|t| match_single_topic(t, sources, cfg))
        .collect();
    let unmatched_topics: Vec<String> = mappings
        .iter()
        .filter(|m| !m.has_match)
        .map(|m| m.topic.title.clone())
        .collect();
    MatchingResult {
        matched_count: mappings.len() - unmatched_topics.len(),
        mappings,
        unmatched_topics,
    }
}

pub const PRIMARY_MARKER: &str = "PRIMARY SOURCE (MANDATORY citation)";
pub const NO_SOURCE_DIRECTIVE: &str =
    "NO VERIFIED SOURCE: do not write about this topic; skip it entirely.";

/// Deterministic rendering of the mappings for the generation layer.
pub fn build_topic_source_context(mappings: &[TopicSourceMapping]) -> String {
    let mut out = String::from("=== TOPIC-SOURCE MAPPING ===\n");
    for (i, m) in mappings.iter().enumerate() {
        let _ = writeln!(out, "\nTOPIC {}: \"{}\"", i + 1, m.topic.title);
        if !m.has_match {
            let _ = writeln!(out, "  {NO_SOURCE_DIRECTIVE}");
            continue;
        }
        let mut rest = m.matched_sources.iter();
        if let Some(primary) = &m.primary_source {
            // element 0 is the primary source
            rest.next();
            let _ = writeln!(out, "  {PRIMARY_MARKER}: {}", primary.title());
            let _ = writeln!(out, "    URL: {}", primary.url());
            let _ = writeln!(out, "    Feed: {}", primary.origin_feed());
            let _ = writeln!(out, "  Supporting sources:");
        } else {
            let _ = writeln!(
                out,
                "  Sources (best relevance {:.2}):",
                m.relevance_score
            );
        }
        let mut any = false;
        for s in rest {
            any = true;
            let _ = writeln!(
                out,
                "    - {} ({}) [{}; relevance {:.2}]",
                s.article.title(),
                s.article.url(),
                s.article.origin_feed(),
                s.score
            );
        }
        if !any {
            let _ = writeln!(out, "    - none");
        }
    }
    out
}
