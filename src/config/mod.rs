// src/config/mod.rs
//! Grounding configuration: every tunable threshold as a named, overridable value.
//!
//! Loaded once by the caller and threaded explicitly into each component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::allocator::{AllocatorConfig, PARTITION_FLOOR};
use crate::matcher::{MatcherConfig, MATCH_THRESHOLD};
use crate::merger::{MergerConfig, DEDUP_SIMILARITY_THRESHOLD};
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::{PipelineConfig, DIVERSITY_FLOOR};
use crate::relevance::ScoringWeights;
use crate::validator::ValidatorConfig;

pub const ENV_CONFIG_PATH: &str = "GROUNDING_CONFIG_PATH";
pub const ENV_MATCH_THRESHOLD: &str = "GROUNDING_MATCH_THRESHOLD";
pub const ENV_DIVERSITY_FLOOR: &str = "GROUNDING_DIVERSITY_FLOOR";
pub const DEFAULT_CONFIG_PATH: &str = "config/grounding.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// When set, replaces the weights of both matcher and allocator.
    pub scoring: Option<ScoringWeights>,
    pub validator: ValidatorConfig,
    pub matcher: MatcherConfig,
    pub allocator: AllocatorConfig,
    pub pipeline: PipelineConfig,
    pub merger: MergerConfig,
    pub orchestrator: OrchestratorConfig,
}

// parse optional float env and clamp to <lo..=hi>
fn parse_clamped_env(raw: Option<String>, lo: f32, hi: f32) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(lo, hi))
}

fn finite_or(v: f32, default: f32, lo: f32, hi: f32) -> f32 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        default
    }
}

impl GroundingConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: GroundingConfig = toml::from_str(s).context("parsing grounding toml")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading grounding config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// 1) $GROUNDING_CONFIG_PATH, 2) config/grounding.toml, 3) built-in defaults.
    /// Env threshold overrides apply on top of whichever was used.
    pub fn load_default() -> Result<Self> {
        let cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => Self::load_from(&PathBuf::from(p))?,
            Err(_) => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::load_from(&p)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(cfg.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(t) = parse_clamped_env(std::env::var(ENV_MATCH_THRESHOLD).ok(), 0.0, 1.0) {
            self.matcher.match_threshold = t;
        }
        if let Some(f) = parse_clamped_env(std::env::var(ENV_DIVERSITY_FLOOR).ok(), 0.0, 100.0) {
            self.pipeline.diversity_floor = f;
        }
        self
    }

    /// Clamp odd values back into range and apply the shared scoring weights.
    pub fn sanitized(mut self) -> Self {
        if let Some(w) = self.scoring {
            let w = ScoringWeights::new(w.title, w.body, w.url);
            self.matcher.weights = w;
            self.allocator.weights = w;
        }
        self.matcher.match_threshold =
            finite_or(self.matcher.match_threshold, MATCH_THRESHOLD, 0.0, 1.0);
        self.allocator.partition_floor =
            finite_or(self.allocator.partition_floor, PARTITION_FLOOR, 0.0, 1.0);
        self.allocator.sources_per_pair = self.allocator.sources_per_pair.max(1);
        self.pipeline.diversity_floor =
            finite_or(self.pipeline.diversity_floor, DIVERSITY_FLOOR, 0.0, 100.0);
        self.merger.dedup_threshold =
            finite_or(self.merger.dedup_threshold, DEDUP_SIMILARITY_THRESHOLD, 0.0, 1.0);
        self
    }
}
