// src/orchestrator.rs
//! Parallel generation across audience/category batches with a two-phase confirm
//! protocol: an unconfirmed request only returns trade-off estimates; a confirmed
//! one fans out, waits for every branch (all-settled) and merges the survivors.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::events::{log_events, PipelineEvent};
use crate::merger::{merge_topics_with_balance, AudienceBatch, MergerConfig, MergerResult};
use crate::topic::{AudienceConfig, Topic};

pub const GENERAL_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// One call per audience.
    PerAudience,
    /// One call per primary category, covering every audience in it.
    PerCategory,
    /// Per category, split into chunks of at most `max_audiences_per_batch`.
    Hybrid,
}

impl GroupingMode {
    pub const ALL: [GroupingMode; 3] = [
        GroupingMode::PerAudience,
        GroupingMode::PerCategory,
        GroupingMode::Hybrid,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub topics_per_audience: usize,
    pub max_audiences_per_batch: usize,
    /// Fixed latency of one generation call.
    pub base_seconds_per_call: f32,
    /// Extra latency per requested topic within one call.
    pub seconds_per_topic: f32,
    pub cost_per_call: f32,
    pub cost_per_topic: f32,
    /// Slow branches past this become recorded failures.
    pub batch_timeout_ms: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            topics_per_audience: 5,
            max_audiences_per_batch: 2,
            base_seconds_per_call: 8.0,
            seconds_per_topic: 2.5,
            cost_per_call: 0.01,
            cost_per_topic: 0.004,
            batch_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBatch {
    pub id: String,
    pub mode: GroupingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub audiences: Vec<AudienceConfig>,
    pub topic_count: usize,
}

impl GenerationBatch {
    pub fn audience_ids(&self) -> impl Iterator<Item = &str> {
        self.audiences.iter().map(|a| a.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeoffEstimate {
    pub mode: GroupingMode,
    pub api_calls: usize,
    /// Wall-clock, branches run concurrently so the slowest batch dominates.
    pub estimated_seconds: f32,
    pub estimated_cost: f32,
}

/// External per-batch generator.
#[async_trait]
pub trait BatchGenerator: Send + Sync {
    async fn generate(&self, batch: &GenerationBatch) -> anyhow::Result<Vec<Topic>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub batch_id: String,
    pub audience_ids: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    NeedsConfirmation {
        estimates: Vec<TradeoffEstimate>,
        recommended: GroupingMode,
    },
    Completed {
        merge: MergerResult,
        failed_batches: Vec<BatchFailure>,
    },
    AllFailed {
        failed_batches: Vec<BatchFailure>,
    },
}

fn primary_category(a: &AudienceConfig) -> String {
    a.categories
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| GENERAL_CATEGORY.to_string())
}

/// Audiences grouped by primary category, first-seen order.
fn by_category(audiences: &[AudienceConfig]) -> Vec<(String, Vec<AudienceConfig>)> {
    let mut groups: Vec<(String, Vec<AudienceConfig>)> = Vec::new();
    for a in audiences {
        let cat = primary_category(a);
        match groups.iter_mut().find(|(c, _)| *c == cat) {
            Some((_, v)) => v.push(a.clone()),
            None => groups.push((cat, vec![a.clone()])),
        }
    }
    groups
}

pub fn build_batches(
    audiences: &[AudienceConfig],
    mode: GroupingMode,
    cfg: &OrchestratorConfig,
) -> Vec<GenerationBatch> {
    let per = cfg.topics_per_audience;
    match mode {
        GroupingMode::PerAudience => audiences
            .iter()
            .map(|a| GenerationBatch {
                id: format!("audience:{}", a.id),
                mode,
                category: None,
                audiences: vec![a.clone()],
                topic_count: per,
            })
            .collect(),
        GroupingMode::PerCategory => by_category(audiences)
            .into_iter()
            .map(|(cat, auds)| GenerationBatch {
                id: format!("category:{cat}"),
                mode,
                topic_count: per * auds.len(),
                category: Some(cat),
                audiences: auds,
            })
            .collect(),
        GroupingMode::Hybrid => {
            let chunk = cfg.max_audiences_per_batch.max(1);
            let mut out = Vec::new();
            for (cat, auds) in by_category(audiences) {
                for (i, part) in auds.chunks(chunk).enumerate() {
                    out.push(GenerationBatch {
                        id: format!("hybrid:{cat}:{i}"),
                        mode,
                        category: Some(cat.clone()),
                        audiences: part.to_vec(),
                        topic_count: per * part.len(),
                    });
                }
            }
            out
        }
    }
}

pub fn estimate_tradeoff(
    audiences: &[AudienceConfig],
    mode: GroupingMode,
    cfg: &OrchestratorConfig,
) -> TradeoffEstimate {
    let batches = build_batches(audiences, mode, cfg);
    let largest = batches.iter().map(|b| b.topic_count).max().unwrap_or(0);
    let total_topics: usize = batches.iter().map(|b| b.topic_count).sum();
    let estimated_seconds = if batches.is_empty() {
        0.0
    } else {
        cfg.base_seconds_per_call + cfg.seconds_per_topic * largest as f32
    };
    TradeoffEstimate {
        mode,
        api_calls: batches.len(),
        estimated_seconds,
        estimated_cost: cfg.cost_per_call * batches.len() as f32
            + cfg.cost_per_topic * total_topics as f32,
    }
}

pub fn estimate_all(audiences: &[AudienceConfig], cfg: &OrchestratorConfig) -> Vec<TradeoffEstimate> {
    GroupingMode::ALL
        .iter()
        .map(|&m| estimate_tradeoff(audiences, m, cfg))
        .collect()
}

/// Fewest calls among the modes that are no slower than the per-audience estimate.
/// Ties keep the `GroupingMode::ALL` order.
pub fn recommend_mode(estimates: &[TradeoffEstimate]) -> GroupingMode {
    let ceiling = estimates
        .iter()
        .find(|e| e.mode == GroupingMode::PerAudience)
        .map(|e| e.estimated_seconds)
        .unwrap_or(f32::INFINITY);
    estimates
        .iter()
        .filter(|e| e.estimated_seconds <= ceiling)
        .min_by_key(|e| e.api_calls)
        .map(|e| e.mode)
        .unwrap_or(GroupingMode::PerAudience)
}

/// Split one batch's topics into per-audience batches. Topics tagged with one of the
/// batch's audiences keep it; the rest are dealt round-robin among the batch audiences.
pub fn split_batch_output(batch: &GenerationBatch, topics: Vec<Topic>) -> Vec<AudienceBatch> {
    let ids: Vec<&str> = batch.audience_ids().collect();
    let mut per: BTreeMap<usize, Vec<Topic>> = BTreeMap::new();
    let mut rr = 0usize;
    for mut t in topics {
        if ids.is_empty() {
            break;
        }
        let idx = match t
            .audience_id
            .as_deref()
            .and_then(|tag| ids.iter().position(|id| *id == tag))
        {
            Some(i) => i,
            None => {
                let i = rr % ids.len();
                rr += 1;
                i
            }
        };
        t.audience_id = Some(ids[idx].to_string());
        per.entry(idx).or_default().push(t);
    }
    batch
        .audiences
        .iter()
        .enumerate()
        .map(|(i, a)| AudienceBatch {
            audience_id: a.id.clone(),
            audience_name: a.name.clone(),
            topics: per.remove(&i).unwrap_or_default(),
            success: true,
            error: None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub audiences: Vec<AudienceConfig>,
    pub mode: GroupingMode,
    /// Without this the orchestrator only returns estimates.
    #[serde(default)]
    pub confirmed: bool,
}

pub struct ParallelOrchestrator {
    generator: Arc<dyn BatchGenerator>,
    config: OrchestratorConfig,
    merger: MergerConfig,
}

impl ParallelOrchestrator {
    pub fn new(generator: Arc<dyn BatchGenerator>, config: OrchestratorConfig, merger: MergerConfig) -> Self {
        Self {
            generator,
            config,
            merger,
        }
    }

    pub async fn run(&self, req: &OrchestrationRequest) -> OrchestrationOutcome {
        if !req.confirmed {
            let estimates = estimate_all(&req.audiences, &self.config);
            let recommended = recommend_mode(&estimates);
            return OrchestrationOutcome::NeedsConfirmation {
                estimates,
                recommended,
            };
        }

        let batches = build_batches(&req.audiences, req.mode, &self.config);
        let timeout = self.config.batch_timeout_ms.map(Duration::from_millis);
        let settled = join_all(batches.iter().map(|b| async move {
            let fut = self.generator.generate(b);
            match timeout {
                Some(t) => match tokio::time::timeout(t, fut).await {
                    Ok(r) => r,
                    Err(_) => Err(anyhow::anyhow!("timed out after {} ms", t.as_millis())),
                },
                None => fut.await,
            }
        }))
        .await;

        let mut audience_batches = Vec::new();
        let mut failed_batches = Vec::new();
        let mut events = Vec::new();
        for (batch, res) in batches.iter().zip(settled) {
            match res {
                Ok(topics) => audience_batches.extend(split_batch_output(batch, topics)),
                Err(e) => {
                    events.push(PipelineEvent::BatchFailed {
                        batch: batch.id.clone(),
                        error: format!("{e:#}"),
                    });
                    failed_batches.push(BatchFailure {
                        batch_id: batch.id.clone(),
                        audience_ids: batch.audience_ids().map(str::to_string).collect(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        log_events(&events);

        if audience_batches.is_empty() {
            return OrchestrationOutcome::AllFailed { failed_batches };
        }
        let merge = merge_topics_with_balance(&audience_batches, &self.merger);
        OrchestrationOutcome::Completed {
            merge,
            failed_batches,
        }
    }
}
