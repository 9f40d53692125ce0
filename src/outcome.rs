// src/outcome.rs
//! Outcome persistence. Not needed for correctness; a failing sink never changes a verdict.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::events::anon_hash;
use crate::pipeline::PreGenerationResult;

/// Compact, anonymised summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub at: DateTime<Utc>,
    pub can_proceed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    /// `anon_hash` of each input topic title, input order.
    pub topic_hashes: Vec<String>,
    pub invalid_topics: usize,
    pub matched_topics: usize,
    pub source_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversity_score: Option<f32>,
}

impl OutcomeRecord {
    pub fn from_result(result: &PreGenerationResult, at: DateTime<Utc>) -> Self {
        Self {
            at,
            can_proceed: result.can_proceed,
            block_reason: result.block_reason.map(|r| r.as_str().to_string()),
            topic_hashes: result
                .validated_topics
                .iter()
                .map(|v| anon_hash(&v.topic))
                .collect(),
            invalid_topics: result.invalid_topics.len(),
            matched_topics: result.source_mappings.iter().filter(|m| m.has_match).count(),
            source_count: result.enriched_sources.len(),
            diversity_score: result.allocation_result.as_ref().map(|a| a.diversity_score),
        }
    }
}

#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn record(&self, outcome: &OutcomeRecord) -> Result<()>;
}

/// Appends one JSON line per run.
pub struct JsonlOutcomeSink {
    path: PathBuf,
}

impl JsonlOutcomeSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutcomeSink for JsonlOutcomeSink {
    async fn record(&self, outcome: &OutcomeRecord) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut line = serde_json::to_string(outcome).context("serializing outcome")?;
        line.push('\n');
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        f.write_all(line.as_bytes())
            .await
            .with_context(|| format!("appending to {}", self.path.display()))?;
        f.flush().await?;
        Ok(())
    }
}
