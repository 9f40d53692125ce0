// tests/orchestrator.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use topic_grounding::orchestrator::{
    BatchGenerator, GenerationBatch, GroupingMode, OrchestratorConfig,
};
use topic_grounding::{
    AudienceConfig, MergerConfig, OrchestrationOutcome, OrchestrationRequest, ParallelOrchestrator,
    Topic,
};

/// Generates `topic_count` topics per batch; batches listed in `fail` error out,
/// batches listed in `stall` never finish within a test timeout.
#[derive(Default)]
struct FakeGenerator {
    fail: Vec<String>,
    stall: Vec<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl BatchGenerator for FakeGenerator {
    async fn generate(&self, batch: &GenerationBatch) -> Result<Vec<Topic>> {
        self.calls.lock().push(batch.id.clone());
        if self.fail.contains(&batch.id) {
            return Err(anyhow::anyhow!("upstream 500"))
                .with_context(|| format!("generating {}", batch.id));
        }
        if self.stall.contains(&batch.id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok((0..batch.topic_count)
            .map(|i| Topic::new(format!("{} topic {i}", batch.id)))
            .collect())
    }
}

fn audiences() -> Vec<AudienceConfig> {
    ["devs", "ops", "execs"]
        .iter()
        .map(|id| AudienceConfig::new(*id, id.to_uppercase()))
        .collect()
}

fn orchestrator(generator: Arc<FakeGenerator>, cfg: OrchestratorConfig) -> ParallelOrchestrator {
    ParallelOrchestrator::new(generator, cfg, MergerConfig::deterministic(6))
}

#[tokio::test]
async fn unconfirmed_request_only_estimates() {
    let generator = Arc::new(FakeGenerator::default());
    let o = orchestrator(generator.clone(), OrchestratorConfig::default());
    let out = o
        .run(&OrchestrationRequest {
            audiences: audiences(),
            mode: GroupingMode::PerAudience,
            confirmed: false,
        })
        .await;

    match out {
        OrchestrationOutcome::NeedsConfirmation { estimates, .. } => {
            assert_eq!(estimates.len(), 3);
            let per_aud = estimates
                .iter()
                .find(|e| e.mode == GroupingMode::PerAudience)
                .unwrap();
            assert_eq!(per_aud.api_calls, 3);
        }
        other => panic!("expected estimates, got {other:?}"),
    }
    assert!(generator.calls.lock().is_empty());
}

#[tokio::test]
async fn one_failed_branch_is_excluded_not_fatal() {
    let generator = Arc::new(FakeGenerator {
        fail: vec!["audience:ops".into()],
        ..Default::default()
    });
    let o = orchestrator(generator, OrchestratorConfig::default());
    let out = o
        .run(&OrchestrationRequest {
            audiences: audiences(),
            mode: GroupingMode::PerAudience,
            confirmed: true,
        })
        .await;

    match out {
        OrchestrationOutcome::Completed {
            merge,
            failed_batches,
        } => {
            assert_eq!(failed_batches.len(), 1);
            assert_eq!(failed_batches[0].audience_ids, vec!["ops".to_string()]);
            assert_eq!(failed_batches[0].error, "generating audience:ops: upstream 500");
            assert_eq!(merge.topics.len(), 6);
            assert_eq!(merge.per_audience_counts["devs"], 3);
            assert_eq!(merge.per_audience_counts["execs"], 3);
            assert!(!merge.per_audience_counts.contains_key("ops"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn every_branch_failing_is_reported() {
    let generator = Arc::new(FakeGenerator {
        fail: vec!["audience:devs".into(), "audience:ops".into(), "audience:execs".into()],
        ..Default::default()
    });
    let o = orchestrator(generator, OrchestratorConfig::default());
    let out = o
        .run(&OrchestrationRequest {
            audiences: audiences(),
            mode: GroupingMode::PerAudience,
            confirmed: true,
        })
        .await;
    match out {
        OrchestrationOutcome::AllFailed { failed_batches } => assert_eq!(failed_batches.len(), 3),
        other => panic!("expected total failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn slow_branch_times_out_without_aborting_siblings() {
    let generator = Arc::new(FakeGenerator {
        stall: vec!["audience:execs".into()],
        ..Default::default()
    });
    let cfg = OrchestratorConfig {
        batch_timeout_ms: Some(1_000),
        ..OrchestratorConfig::default()
    };
    let o = orchestrator(generator, cfg);
    let out = o
        .run(&OrchestrationRequest {
            audiences: audiences(),
            mode: GroupingMode::PerAudience,
            confirmed: true,
        })
        .await;
    match out {
        OrchestrationOutcome::Completed {
            merge,
            failed_batches,
        } => {
            assert_eq!(failed_batches.len(), 1);
            assert!(failed_batches[0].error.contains("timed out"));
            assert_eq!(merge.per_audience_counts.len(), 2);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn category_batches_are_split_back_per_audience() {
    let mut auds = audiences();
    for a in &mut auds {
        a.categories = vec!["tech".into()];
    }
    let generator = Arc::new(FakeGenerator::default());
    let o = orchestrator(generator.clone(), OrchestratorConfig::default());
    let out = o
        .run(&OrchestrationRequest {
            audiences: auds,
            mode: GroupingMode::PerCategory,
            confirmed: true,
        })
        .await;
    assert_eq!(*generator.calls.lock(), vec!["category:tech".to_string()]);
    match out {
        OrchestrationOutcome::Completed { merge, .. } => {
            assert_eq!(merge.per_audience_counts.len(), 3);
            assert!(merge.per_audience_counts.values().all(|n| *n == 2));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
