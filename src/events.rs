// src/events.rs
//! Structured pipeline events and the thin adapter that turns them into logs and metrics.
//!
//! Algorithms return `PipelineEvent`s; only `log_events` talks to `tracing`/`metrics`.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};

/// Where the source pool came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolOrigin {
    Caller,
    Feeds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    ValidationCompleted {
        validated: usize,
        pre_sourced: usize,
        invalid: usize,
        unknown: usize,
    },
    TopicFictional {
        topic: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
    },
    ValidationUnavailable {
        topic: String,
        error: String,
    },
    SourcesCollected {
        origin: PoolOrigin,
        count: usize,
        failed_feeds: Vec<String>,
    },
    FetchFailed {
        error: String,
    },
    PrimaryExtractionFailed {
        topic: String,
        url: String,
        error: String,
    },
    PrimarySourceMissing {
        topic: String,
        url: String,
    },
    TopicsMatched {
        matched: usize,
        unmatched: usize,
    },
    EnrichmentAdded {
        topic: String,
        sources: usize,
    },
    EnrichmentFailed {
        topic: String,
        error: String,
    },
    AllocationCompleted {
        audiences: usize,
        allocations: usize,
        diversity_score: f32,
        reused_urls: usize,
        under_sourced: usize,
    },
    Blocked {
        reason: String,
    },
    Proceeding {
        topics: usize,
        sources: usize,
    },
    BatchFailed {
        batch: String,
        error: String,
    },
    OutcomeNotRecorded {
        error: String,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::ValidationCompleted { .. } => "validation_completed",
            PipelineEvent::TopicFictional { .. } => "topic_fictional",
            PipelineEvent::ValidationUnavailable { .. } => "validation_unavailable",
            PipelineEvent::SourcesCollected { .. } => "sources_collected",
            PipelineEvent::FetchFailed { .. } => "fetch_failed",
            PipelineEvent::PrimaryExtractionFailed { .. } => "primary_extraction_failed",
            PipelineEvent::PrimarySourceMissing { .. } => "primary_source_missing",
            PipelineEvent::TopicsMatched { .. } => "topics_matched",
            PipelineEvent::EnrichmentAdded { .. } => "enrichment_added",
            PipelineEvent::EnrichmentFailed { .. } => "enrichment_failed",
            PipelineEvent::AllocationCompleted { .. } => "allocation_completed",
            PipelineEvent::Blocked { .. } => "blocked",
            PipelineEvent::Proceeding { .. } => "proceeding",
            PipelineEvent::BatchFailed { .. } => "batch_failed",
            PipelineEvent::OutcomeNotRecorded { .. } => "outcome_not_recorded",
        }
    }
}

/// Short SHA-256 prefix, so topic titles never reach info logs verbatim.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("grounding_runs_total", "Pre-generation runs by verdict.");
        describe_counter!("grounding_blocked_total", "Blocked runs by reason.");
        describe_counter!(
            "grounding_fictional_topics_total",
            "Topics classified fictional."
        );
        describe_counter!(
            "grounding_validation_unknown_total",
            "Validations that could not reach the search provider."
        );
        describe_counter!(
            "grounding_primary_source_missing_total",
            "Declared resource URLs absent from the pool."
        );
        describe_counter!(
            "grounding_enriched_sources_total",
            "Sources added by web-search enrichment."
        );
        describe_counter!(
            "orchestrator_batch_failures_total",
            "Generation batches that failed or timed out."
        );
        describe_gauge!(
            "grounding_diversity_score",
            "Diversity score of the latest allocation (0-100)."
        );
    });
}

/// Emit every event as a tracing record and update the matching metrics.
pub fn log_events(events: &[PipelineEvent]) {
    ensure_metrics_described();
    for ev in events {
        match ev {
            PipelineEvent::ValidationCompleted {
                validated,
                pre_sourced,
                invalid,
                unknown,
            } => {
                info!(target: "grounding", validated, pre_sourced, invalid, unknown, "validation completed");
            }
            PipelineEvent::TopicFictional { topic, suggestion } => {
                counter!("grounding_fictional_topics_total").increment(1);
                info!(
                    target: "grounding",
                    topic_hash = %anon_hash(topic),
                    has_suggestion = suggestion.is_some(),
                    "topic classified fictional"
                );
            }
            PipelineEvent::ValidationUnavailable { topic, error } => {
                counter!("grounding_validation_unknown_total").increment(1);
                warn!(target: "grounding", topic_hash = %anon_hash(topic), %error, "validation unavailable, assuming valid");
            }
            PipelineEvent::SourcesCollected {
                origin,
                count,
                failed_feeds,
            } => {
                if failed_feeds.is_empty() {
                    info!(target: "grounding", ?origin, count, "sources collected");
                } else {
                    warn!(target: "grounding", ?origin, count, ?failed_feeds, "sources collected with failed feeds");
                }
            }
            PipelineEvent::FetchFailed { error } => {
                warn!(target: "ingest", %error, "multi-feed fetch failed");
            }
            PipelineEvent::PrimaryExtractionFailed { topic, url, error } => {
                warn!(target: "grounding", topic_hash = %anon_hash(topic), %url, %error, "primary source extraction failed, using stub");
            }
            PipelineEvent::PrimarySourceMissing { topic, url } => {
                counter!("grounding_primary_source_missing_total").increment(1);
                warn!(target: "grounding", topic_hash = %anon_hash(topic), %url, "declared primary source not in pool");
            }
            PipelineEvent::TopicsMatched { matched, unmatched } => {
                info!(target: "grounding", matched, unmatched, "topics matched");
            }
            PipelineEvent::EnrichmentAdded { topic, sources } => {
                counter!("grounding_enriched_sources_total").increment(*sources as u64);
                info!(target: "grounding", topic_hash = %anon_hash(topic), sources, "enriched from web search");
            }
            PipelineEvent::EnrichmentFailed { topic, error } => {
                warn!(target: "grounding", topic_hash = %anon_hash(topic), %error, "enrichment search failed");
            }
            PipelineEvent::AllocationCompleted {
                audiences,
                allocations,
                diversity_score,
                reused_urls,
                under_sourced,
            } => {
                gauge!("grounding_diversity_score").set(*diversity_score as f64);
                info!(
                    target: "grounding",
                    audiences,
                    allocations,
                    diversity_score,
                    reused_urls,
                    under_sourced,
                    "sources allocated"
                );
            }
            PipelineEvent::Blocked { reason } => {
                counter!("grounding_runs_total", "verdict" => "blocked").increment(1);
                counter!("grounding_blocked_total", "reason" => reason.clone()).increment(1);
                warn!(target: "grounding", %reason, "generation blocked");
            }
            PipelineEvent::Proceeding { topics, sources } => {
                counter!("grounding_runs_total", "verdict" => "proceed").increment(1);
                info!(target: "grounding", topics, sources, "generation may proceed");
            }
            PipelineEvent::BatchFailed { batch, error } => {
                counter!("orchestrator_batch_failures_total").increment(1);
                warn!(target: "orchestrator", %batch, %error, "generation batch failed");
            }
            PipelineEvent::OutcomeNotRecorded { error } => {
                warn!(target: "grounding", %error, "outcome sink failed");
            }
        }
    }
}
