// src/validator.rs
//! Topic validator: decides whether a topic is real/current or fictional.
//!
//! Order:
//! 1) Version heuristic (no network): a known product with a version above its
//!    public ceiling is fictional right away.
//! 2) Web search for `"<topic>" news OR announcement OR release <years>`.
//! 3) Classify the raw result text into a confidence tier.
//!
//! A search failure is `Confidence::Unknown`, never `Confidence::None`.

use crate::ingest::types::WebSearch;
use anyhow::Context;
use chrono::Datelike;
use futures::future::join_all;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const VALIDATION_STAGGER_MS: u64 = 200;

// (results, quality) thresholds per tier
pub const HIGH_MIN_RESULTS: usize = 5;
pub const HIGH_MIN_QUALITY: usize = 3;
pub const MEDIUM_MIN_RESULTS: usize = 3;
pub const MEDIUM_MIN_QUALITY: usize = 1;
pub const LOW_MIN_RESULTS: usize = 1;

const NO_RESULT_MARKERS: &[&str] = &[
    "no results found",
    "no search results",
    "no results",
    "search unavailable",
    "search is unavailable",
    "search failed",
    "unable to perform search",
];

const AUTHORITATIVE_DOMAINS: &[&str] = &[
    "wikipedia.org",
    "github.com",
    "reuters.com",
    "apnews.com",
    "bloomberg.com",
    "techcrunch.com",
    "theverge.com",
    "arstechnica.com",
    "wired.com",
    "nytimes.com",
    "bbc.co",
    "cnbc.com",
    "zdnet.com",
    "venturebeat.com",
    ".gov",
    ".edu",
];

const QUALITY_PHRASES: &[&str] = &[
    "announced",
    "announces",
    "released",
    "launches",
    "launched",
    "official",
    "press release",
    "now available",
    "general availability",
];

/// How certain the validator is that a topic is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    /// Treated as fictional.
    None,
    /// Validation was unavailable; must not be treated as fictional.
    Unknown,
}

impl Confidence {
    pub fn is_fictional(self) -> bool {
        self == Confidence::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicValidationResult {
    pub topic: String,
    pub is_valid: bool,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_alternative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub result_count: usize,
    #[serde(default)]
    pub quality_signals: usize,
}

impl TopicValidationResult {
    fn with_confidence(topic: &str, confidence: Confidence) -> Self {
        Self {
            topic: topic.to_string(),
            is_valid: !confidence.is_fictional(),
            confidence,
            suggested_alternative: None,
            error: None,
            result_count: 0,
            quality_signals: 0,
        }
    }

    /// Result for a topic whose resource URL was confirmed upstream.
    pub fn pre_sourced(topic: &str) -> Self {
        Self::with_confidence(topic, Confidence::High)
    }
}

/// Aggregate of a batch run; `results` follow the input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidation {
    pub results: Vec<TopicValidationResult>,
    pub all_valid: bool,
    /// Topics with confidence exactly `none`.
    pub invalid_topics: Vec<String>,
    /// Topics whose validation was unavailable.
    pub unknown_topics: Vec<String>,
}

impl BatchValidation {
    pub fn from_results(results: Vec<TopicValidationResult>) -> Self {
        let invalid_topics: Vec<String> = results
            .iter()
            .filter(|r| r.confidence == Confidence::None)
            .map(|r| r.topic.clone())
            .collect();
        let unknown_topics = results
            .iter()
            .filter(|r| r.confidence == Confidence::Unknown)
            .map(|r| r.topic.clone())
            .collect();
        Self {
            all_valid: invalid_topics.is_empty(),
            results,
            invalid_topics,
            unknown_topics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Start-time increment between concurrent validations.
    pub stagger_ms: u64,
    /// Product name -> highest publicly known version.
    pub version_ceilings: BTreeMap<String, ProductVersion>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let version_ceilings = [
            ("ChatGPT", 5, 0),
            ("GPT", 5, 0),
            ("Claude", 5, 0),
            ("Gemini", 3, 0),
            ("Llama", 4, 0),
            ("iPhone", 17, 0),
            ("iOS", 26, 0),
            ("macOS", 26, 0),
            ("Android", 16, 0),
            ("Windows", 11, 0),
            ("Pixel", 10, 0),
            ("PlayStation", 5, 0),
            ("Python", 3, 14),
        ]
        .into_iter()
        .map(|(k, major, minor)| (k.to_string(), ProductVersion::new(major, minor)))
        .collect();
        Self {
            stagger_ms: VALIDATION_STAGGER_MS,
            version_ceilings,
        }
    }
}

/// `major.minor`, compared component-wise: 3.9 < 3.14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVersion", into = "String")]
pub struct ProductVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProductVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{}", self.major)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl FromStr for ProductVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().trim_start_matches(['v', 'V']);
        let (major, minor) = t.split_once('.').unwrap_or((t, "0"));
        let major = major
            .parse()
            .with_context(|| format!("bad major version in {s:?}"))?;
        let minor = minor
            .parse()
            .with_context(|| format!("bad minor version in {s:?}"))?;
        Ok(Self { major, minor })
    }
}

impl From<ProductVersion> for String {
    fn from(v: ProductVersion) -> Self {
        v.to_string()
    }
}

/// TOML accepts `Python = "3.14"` as well as `Claude = 5`. Write minors of 10 and
/// up as strings: the float 3.10 reads back as 3.1.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Text(String),
    Number(f64),
}

impl TryFrom<RawVersion> for ProductVersion {
    type Error = anyhow::Error;

    fn try_from(raw: RawVersion) -> Result<Self, Self::Error> {
        match raw {
            RawVersion::Text(s) => s.parse(),
            RawVersion::Number(n) if n.is_finite() && n >= 0.0 => n.to_string().parse(),
            RawVersion::Number(n) => anyhow::bail!("version must be non-negative, got {n}"),
        }
    }
}

/// Numbers in this range with four digits read as years ("ChatGPT 2025 roundup").
pub const YEAR_RANGE: std::ops::RangeInclusive<u32> = 1900..=2100;
/// A major this many times the ceiling is a model name, not a version ("Windows 2000").
pub const MAX_VERSION_FACTOR: u32 = 10;

/// A version-number hit above the known ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionOverflow {
    pub product: String,
    pub found: ProductVersion,
    pub ceiling: ProductVersion,
}

impl VersionOverflow {
    pub fn suggestion(&self) -> String {
        format!("{} {}", self.product, self.ceiling)
    }
}

fn is_plausible_version(digits: &str, found: ProductVersion, ceiling: ProductVersion) -> bool {
    if digits.len() == 4 && YEAR_RANGE.contains(&found.major) {
        return false;
    }
    found.major <= ceiling.major.max(1).saturating_mul(MAX_VERSION_FACTOR)
}

/// Quick offline check: does `topic` mention a known product with a version above its ceiling?
pub fn check_version_heuristic(
    topic: &str,
    ceilings: &BTreeMap<String, ProductVersion>,
) -> Option<VersionOverflow> {
    for (product, &ceiling) in ceilings {
        let pattern = format!(r"(?i)\b{}[\s-]*v?(\d+)(?:\.(\d+))?\b", regex::escape(product));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        for caps in re.captures_iter(topic) {
            let Some(major_digits) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let Ok(major) = major_digits.parse::<u32>() else {
                continue;
            };
            let minor = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            let found = ProductVersion::new(major, minor);
            if !is_plausible_version(major_digits, found, ceiling) {
                continue;
            }
            if found > ceiling {
                return Some(VersionOverflow {
                    product: product.clone(),
                    found,
                    ceiling,
                });
            }
        }
    }
    None
}

/// `"<topic>" news OR announcement OR release <prev year> OR <year>`
pub fn build_validation_query(topic: &str, year: i32) -> String {
    format!(
        "\"{}\" news OR announcement OR release {} OR {}",
        topic.trim(),
        year - 1,
        year
    )
}

/// Count of itemised results ("1. ...", "2. ...") in raw search text.
pub fn count_result_items(raw: &str) -> usize {
    static RE_ITEM: OnceCell<Regex> = OnceCell::new();
    let re = RE_ITEM.get_or_init(|| Regex::new(r"(?m)^\s*\d+\.\s+\S").unwrap());
    re.find_iter(raw).count()
}

/// Number of distinct authoritative-domain and phrase indicators present.
pub fn quality_signals(raw: &str) -> usize {
    let lower = raw.to_lowercase();
    AUTHORITATIVE_DOMAINS
        .iter()
        .chain(QUALITY_PHRASES.iter())
        .filter(|ind| lower.contains(*ind))
        .count()
}

pub fn has_no_result_marker(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    raw.trim().is_empty() || NO_RESULT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Map (result count, quality signals) onto a tier.
pub fn confidence_for(count: usize, quality: usize) -> Confidence {
    if count >= HIGH_MIN_RESULTS && quality >= HIGH_MIN_QUALITY {
        Confidence::High
    } else if count >= MEDIUM_MIN_RESULTS && quality >= MEDIUM_MIN_QUALITY {
        Confidence::Medium
    } else if count >= LOW_MIN_RESULTS {
        Confidence::Low
    } else {
        Confidence::None
    }
}

/// Classify raw search output. Returns (tier, result count, quality signals).
pub fn classify_search_results(raw: &str) -> (Confidence, usize, usize) {
    if has_no_result_marker(raw) {
        return (Confidence::None, 0, 0);
    }
    let count = count_result_items(raw);
    let quality = quality_signals(raw);
    (confidence_for(count, quality), count, quality)
}

/// Validator bound to a search collaborator and explicit config.
pub struct TopicValidator {
    search: Arc<dyn WebSearch>,
    config: ValidatorConfig,
}

impl TopicValidator {
    pub fn new(search: Arc<dyn WebSearch>, config: ValidatorConfig) -> Self {
        Self { search, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub async fn validate_single_topic(&self, topic: &str) -> TopicValidationResult {
        self.validate_for_year(topic, chrono::Utc::now().year()).await
    }

    /// Same as [`validate_single_topic`](Self::validate_single_topic) with a fixed year.
    pub async fn validate_for_year(&self, topic: &str, year: i32) -> TopicValidationResult {
        if topic.trim().is_empty() {
            let mut r = TopicValidationResult::with_confidence(topic, Confidence::None);
            r.error = Some("empty topic".into());
            return r;
        }

        if let Some(overflow) = check_version_heuristic(topic, &self.config.version_ceilings) {
            let mut r = TopicValidationResult::with_confidence(topic, Confidence::None);
            r.suggested_alternative = Some(overflow.suggestion());
            return r;
        }

        let query = build_validation_query(topic, year);
        match self.search.search(&query).await {
            Ok(raw) => {
                let (confidence, count, quality) = classify_search_results(&raw);
                let mut r = TopicValidationResult::with_confidence(topic, confidence);
                r.result_count = count;
                r.quality_signals = quality;
                r
            }
            Err(e) => {
                let mut r = TopicValidationResult::with_confidence(topic, Confidence::Unknown);
                r.error = Some(format!("{e:#}"));
                r
            }
        }
    }

    /// Validate concurrently; start times are staggered by `stagger_ms * index`.
    pub async fn validate_topics(&self, topics: &[String]) -> BatchValidation {
        let year = chrono::Utc::now().year();
        let stagger = self.config.stagger_ms;
        let futs = topics.iter().enumerate().map(|(i, t)| async move {
            if stagger > 0 && i > 0 {
                tokio::time::sleep(Duration::from_millis(stagger * i as u64)).await;
            }
            self.validate_for_year(t, year).await
        });
        BatchValidation::from_results(join_all(futs).await)
    }
}
