// src/lib.rs
// Public library surface for integration tests and the probe binary.

pub mod keywords;
pub mod relevance;
pub mod source;
pub mod topic;

pub mod validator;
pub mod matcher;
pub mod allocator;
pub mod pipeline;

// Batch generation fan-out and merge
pub mod merger;
pub mod orchestrator;

pub mod config;
pub mod events;
pub mod ingest;
pub mod metrics;
pub mod outcome;

// ---- Re-exports for stable public API ----
pub use crate::allocator::{allocate_sources_to_audiences, build_allocation_context, AllocationResult, SourceAllocation};
pub use crate::config::GroundingConfig;
pub use crate::keywords::extract_keywords;
pub use crate::matcher::{build_topic_source_context, match_topics_to_sources, TopicSourceMapping};
pub use crate::merger::{merge_topics_with_balance, AudienceBatch, MergerConfig, MergerResult};
pub use crate::orchestrator::{OrchestrationOutcome, OrchestrationRequest, ParallelOrchestrator};
pub use crate::pipeline::{BlockReason, PreGenerationPipeline, PreGenerationRequest, PreGenerationResult};
pub use crate::relevance::calculate_relevance_score;
pub use crate::source::{ExtractedArticle, SourceArticle};
pub use crate::topic::{AudienceConfig, Topic, TopicInput};
pub use crate::validator::{Confidence, TopicValidationResult, TopicValidator};
