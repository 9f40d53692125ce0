// src/pipeline.rs
//! Pre-generation checks: validate -> collect -> match -> enrich -> re-match ->
//! guards -> allocate. Stages run strictly in order; a guard that fires ends the run
//! with a structured block, never an error.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::{allocate_sources_to_audiences, build_allocation_context, AllocationResult};
use crate::config::GroundingConfig;
use crate::events::{log_events, PipelineEvent, PoolOrigin};
use crate::ingest::search::parse_search_hits;
use crate::ingest::types::{
    apply_extraction, ArticleExtractor, ExtractOptions, FetchOptions, SourceFetcher, WebSearch,
};
use crate::keywords::{extract_keywords, merge_capped};
use crate::matcher::{build_topic_source_context, match_topics_to_sources, TopicSourceMapping};
use crate::outcome::{OutcomeRecord, OutcomeSink};
use crate::source::{normalize_url, urls_match, ExtractedArticle, SourceArticle};
use crate::topic::{normalize_topics, AudienceConfig, Topic, TopicInput};
use crate::validator::{
    has_no_result_marker, BatchValidation, Confidence, TopicValidationResult, TopicValidator,
};

pub const DIVERSITY_FLOOR: f32 = 50.0;
pub const MAX_FETCH_KEYWORDS: usize = 10;
pub const MAX_FETCH_SUBREDDITS: usize = 5;
pub const MAX_FETCH_CATEGORIES: usize = 4;
pub const DEFAULT_FETCH_LIMIT: usize = 50;
pub const ENRICHMENT_MAX_RESULTS: usize = 3;
pub const ENRICHMENT_DELAY_MS: u64 = 200;
/// `origin_feed` of a body-less stub built from a topic's own resource URL.
pub const PRIMARY_STUB_FEED: &str = "primary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum diversity score when more than one audience is involved.
    pub diversity_floor: f32,
    pub max_keywords: usize,
    pub max_subreddits: usize,
    pub max_categories: usize,
    pub fetch_limit: usize,
    /// Run full-text extraction over the fetched pool before matching.
    pub extract_pool: bool,
    pub extract: ExtractOptions,
    pub enrichment_max_results: usize,
    pub enrichment_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            diversity_floor: DIVERSITY_FLOOR,
            max_keywords: MAX_FETCH_KEYWORDS,
            max_subreddits: MAX_FETCH_SUBREDDITS,
            max_categories: MAX_FETCH_CATEGORIES,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            extract_pool: true,
            extract: ExtractOptions::default(),
            enrichment_max_results: ENRICHMENT_MAX_RESULTS,
            enrichment_delay_ms: ENRICHMENT_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockReason {
    NoTopics,
    AllTopicsFictional,
    NoSourcesAvailable,
    InsufficientDiversity { score: f32, floor: f32 },
}

impl BlockReason {
    /// Machine-readable reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::NoTopics => "no_topics",
            BlockReason::AllTopicsFictional => "all_topics_fictional",
            BlockReason::NoSourcesAvailable => "no_sources_available",
            BlockReason::InsufficientDiversity { .. } => "insufficient_source_diversity",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::NoTopics => write!(f, "no topics provided"),
            BlockReason::AllTopicsFictional => write!(f, "all topics fictional"),
            BlockReason::NoSourcesAvailable => write!(f, "no sources available"),
            BlockReason::InsufficientDiversity { score, floor } => write!(
                f,
                "insufficient source diversity ({score:.0} < {floor:.0})"
            ),
        }
    }
}

impl Serialize for BlockReason {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// One pipeline invocation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreGenerationRequest {
    pub topics: Vec<TopicInput>,
    pub audiences: Vec<AudienceConfig>,
    /// Caller-supplied pool; when non-empty the fetch collaborator is skipped.
    pub sources: Option<Vec<ExtractedArticle>>,
    /// Topic title -> audience id; wins over the topic's own tag.
    pub topic_audience_map: Option<HashMap<String, String>>,
}

impl PreGenerationRequest {
    pub fn new<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TopicInput>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_audiences(mut self, audiences: Vec<AudienceConfig>) -> Self {
        self.audiences = audiences;
        self
    }

    pub fn with_sources(mut self, sources: Vec<ExtractedArticle>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_topic_audience_map(mut self, map: HashMap<String, String>) -> Self {
        self.topic_audience_map = Some(map);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreGenerationResult {
    pub can_proceed: bool,
    /// One entry per input topic, input order. Pre-sourced topics are `high`.
    pub validated_topics: Vec<TopicValidationResult>,
    pub invalid_topics: Vec<String>,
    pub source_mappings: Vec<TopicSourceMapping>,
    /// Final pool: fetched or supplied sources, primary sources, web-search additions.
    pub enriched_sources: Vec<ExtractedArticle>,
    pub topic_source_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_result: Option<AllocationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    pub suggested_alternatives: Vec<String>,
    pub events: Vec<PipelineEvent>,
}

impl PreGenerationResult {
    fn empty() -> Self {
        Self {
            can_proceed: false,
            validated_topics: Vec::new(),
            invalid_topics: Vec::new(),
            source_mappings: Vec::new(),
            enriched_sources: Vec::new(),
            topic_source_context: String::new(),
            allocation_result: None,
            allocation_context: None,
            block_reason: None,
            user_message: None,
            suggested_alternatives: Vec::new(),
            events: Vec::new(),
        }
    }

    fn block(mut self, reason: BlockReason) -> Self {
        self.can_proceed = false;
        self.user_message = Some(block_message(reason, &self));
        self.block_reason = Some(reason);
        self.events.push(PipelineEvent::Blocked {
            reason: reason.as_str().to_string(),
        });
        self
    }

    fn proceed(mut self) -> Self {
        self.can_proceed = true;
        if !self.invalid_topics.is_empty() {
            self.user_message = Some(format!(
                "Skipping topics that look fictional: {}",
                self.invalid_topics.join(", ")
            ));
        }
        self.events.push(PipelineEvent::Proceeding {
            topics: self.source_mappings.len(),
            sources: self.enriched_sources.len(),
        });
        self
    }

    /// Mapping for one topic title.
    pub fn mapping_for(&self, title: &str) -> Option<&TopicSourceMapping> {
        self.source_mappings.iter().find(|m| m.topic.title == title)
    }
}

fn block_message(reason: BlockReason, r: &PreGenerationResult) -> String {
    match reason {
        BlockReason::NoTopics => "No topics were provided.".to_string(),
        BlockReason::AllTopicsFictional => {
            let mut msg = format!(
                "All topics appear to be fictional or unverifiable: {}.",
                r.invalid_topics.join(", ")
            );
            if !r.suggested_alternatives.is_empty() {
                msg.push_str(&format!(" Did you mean: {}?", r.suggested_alternatives.join(", ")));
            }
            msg
        }
        BlockReason::NoSourcesAvailable => {
            "No sources could be collected from any feed, so there is nothing to ground the content in."
                .to_string()
        }
        BlockReason::InsufficientDiversity { score, floor } => format!(
            "Audiences would share too many sources (diversity {score:.0}/100, minimum {floor:.0}). \
             Add audience-specific keywords or topics."
        ),
    }
}

/// Fetch hints aggregated from audiences plus topic keywords, de-duplicated and capped.
pub fn build_fetch_options(
    audiences: &[AudienceConfig],
    topics: &[Topic],
    cfg: &PipelineConfig,
) -> FetchOptions {
    let topic_keywords: Vec<String> = topics
        .iter()
        .flat_map(|t| extract_keywords(&t.title))
        .collect();
    let keywords = merge_capped(
        audiences
            .iter()
            .flat_map(|a| a.keywords.iter().cloned())
            .chain(topic_keywords),
        cfg.max_keywords,
    );
    FetchOptions {
        keywords,
        subreddits: merge_capped(
            audiences.iter().flat_map(|a| a.subreddits.iter()),
            cfg.max_subreddits,
        ),
        categories: merge_capped(
            audiences.iter().flat_map(|a| a.categories.iter()),
            cfg.max_categories,
        ),
        limit: cfg.fetch_limit,
    }
}

/// Per-topic validation results in input order, pre-sourced topics marked `high`.
fn merge_validation(topics: &[Topic], batch: &BatchValidation) -> Vec<TopicValidationResult> {
    let mut validated = batch.results.iter();
    topics
        .iter()
        .map(|t| {
            if t.is_pre_sourced() {
                TopicValidationResult::pre_sourced(&t.title)
            } else {
                validated
                    .next()
                    .cloned()
                    .unwrap_or_else(|| TopicValidationResult::pre_sourced(&t.title))
            }
        })
        .collect()
}

pub struct PreGenerationPipeline {
    validator: TopicValidator,
    search: Arc<dyn WebSearch>,
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn ArticleExtractor>,
    sink: Option<Arc<dyn OutcomeSink>>,
    config: GroundingConfig,
}

impl PreGenerationPipeline {
    pub fn new(
        search: Arc<dyn WebSearch>,
        fetcher: Arc<dyn SourceFetcher>,
        extractor: Arc<dyn ArticleExtractor>,
        config: GroundingConfig,
    ) -> Self {
        Self {
            validator: TopicValidator::new(search.clone(), config.validator.clone()),
            search,
            fetcher,
            extractor,
            sink: None,
            config,
        }
    }

    pub fn with_outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    /// Run every stage and return the verdict. Events are logged once, at the end.
    pub async fn run_pre_generation_checks(&self, req: PreGenerationRequest) -> PreGenerationResult {
        let mut result = self.run_stages(req).await;
        if let Some(sink) = &self.sink {
            let record = OutcomeRecord::from_result(&result, chrono::Utc::now());
            if let Err(e) = sink.record(&record).await {
                result.events.push(PipelineEvent::OutcomeNotRecorded {
                    error: format!("{e:#}"),
                });
            }
        }
        log_events(&result.events);
        result
    }

    async fn run_stages(&self, req: PreGenerationRequest) -> PreGenerationResult {
        let cfg = &self.config;
        let mut out = PreGenerationResult::empty();

        // 1. normalize
        let topics = normalize_topics(req.topics);
        if topics.is_empty() {
            return out.block(BlockReason::NoTopics);
        }
        let pre_sourced = topics.iter().filter(|t| t.is_pre_sourced()).count();
        let needs: Vec<String> = topics
            .iter()
            .filter(|t| !t.is_pre_sourced())
            .map(|t| t.title.clone())
            .collect();

        // 2. validate
        let batch = if needs.is_empty() {
            BatchValidation::from_results(Vec::new())
        } else {
            self.validator.validate_topics(&needs).await
        };
        for r in &batch.results {
            if r.confidence.is_fictional() {
                out.events.push(PipelineEvent::TopicFictional {
                    topic: r.topic.clone(),
                    suggestion: r.suggested_alternative.clone(),
                });
            } else if r.confidence == Confidence::Unknown {
                out.events.push(PipelineEvent::ValidationUnavailable {
                    topic: r.topic.clone(),
                    error: r.error.clone().unwrap_or_default(),
                });
            }
        }
        out.events.push(PipelineEvent::ValidationCompleted {
            validated: batch.results.len(),
            pre_sourced,
            invalid: batch.invalid_topics.len(),
            unknown: batch.unknown_topics.len(),
        });
        out.validated_topics = merge_validation(&topics, &batch);
        out.invalid_topics = batch.invalid_topics.clone();
        out.suggested_alternatives = batch
            .results
            .iter()
            .filter_map(|r| r.suggested_alternative.clone())
            .collect();

        // 3. guard A
        let all_fictional = !batch.results.is_empty()
            && batch.results.iter().all(|r| r.confidence.is_fictional());
        if all_fictional && pre_sourced == 0 && batch.unknown_topics.is_empty() {
            return out.block(BlockReason::AllTopicsFictional);
        }
        let fictional: HashSet<&str> = batch.invalid_topics.iter().map(String::as_str).collect();
        let live: Vec<Topic> = topics
            .iter()
            .filter(|t| t.is_pre_sourced() || !fictional.contains(t.title.as_str()))
            .cloned()
            .collect();

        // 4. collect
        let mut pool: Vec<ExtractedArticle> = match req.sources.filter(|s| !s.is_empty()) {
            Some(supplied) => {
                out.events.push(PipelineEvent::SourcesCollected {
                    origin: PoolOrigin::Caller,
                    count: supplied.len(),
                    failed_feeds: Vec::new(),
                });
                supplied
            }
            None => self.fetch_pool(&req.audiences, &live, &mut out.events).await,
        };
        let mut grounded = pool.len();
        for t in live.iter().filter(|t| t.is_pre_sourced()) {
            let url = t.resource.as_deref().unwrap_or_default().trim();
            if pool.iter().any(|a| urls_match(a.url(), url)) {
                continue;
            }
            let (article, extracted) = self.primary_source(t, url, &mut out.events).await;
            if extracted {
                grounded += 1;
            }
            pool.push(article);
        }

        // 5. match
        let mut matching = match_topics_to_sources(&live, &pool, &cfg.matcher);
        for m in matching.mappings.iter().filter(|m| m.primary_source_missing()) {
            out.events.push(PipelineEvent::PrimarySourceMissing {
                topic: m.topic.title.clone(),
                url: m.primary_source_url.clone().unwrap_or_default(),
            });
        }

        // 6. enrich unmatched, 7. re-match
        let before = pool.len();
        self.enrich_unmatched(&matching.unmatched_topics, &mut pool, &mut out.events)
            .await;
        if pool.len() > before {
            matching = match_topics_to_sources(&live, &pool, &cfg.matcher);
        }
        out.events.push(PipelineEvent::TopicsMatched {
            matched: matching.matched_count,
            unmatched: matching.unmatched_topics.len(),
        });
        out.topic_source_context = build_topic_source_context(&matching.mappings);
        out.source_mappings = matching.mappings;
        out.enriched_sources = pool;

        // 8. guard B
        if grounded == 0 {
            return out.block(BlockReason::NoSourcesAvailable);
        }

        // 9. allocate
        if !req.audiences.is_empty() {
            let allocation = allocate_sources_to_audiences(
                &live,
                &req.audiences,
                &out.enriched_sources,
                req.topic_audience_map.as_ref(),
                &cfg.allocator,
            );
            out.events.push(PipelineEvent::AllocationCompleted {
                audiences: req.audiences.len(),
                allocations: allocation.allocations.len(),
                diversity_score: allocation.diversity_score,
                reused_urls: allocation.reused_urls.len(),
                under_sourced: allocation.under_sourced_topics.len(),
            });
            out.allocation_context = Some(build_allocation_context(&allocation));
            let score = allocation.diversity_score;
            out.allocation_result = Some(allocation);

            // 10. guard C
            let floor = cfg.pipeline.diversity_floor;
            if req.audiences.len() > 1 && score < floor {
                return out.block(BlockReason::InsufficientDiversity { score, floor });
            }
        }

        // 11. proceed
        out.proceed()
    }

    async fn fetch_pool(
        &self,
        audiences: &[AudienceConfig],
        topics: &[Topic],
        events: &mut Vec<PipelineEvent>,
    ) -> Vec<ExtractedArticle> {
        let opts = build_fetch_options(audiences, topics, &self.config.pipeline);
        let fetched = match self.fetcher.fetch_all_sources(&opts).await {
            Ok(outcome) => {
                events.push(PipelineEvent::SourcesCollected {
                    origin: PoolOrigin::Feeds,
                    count: outcome.articles.len(),
                    failed_feeds: outcome
                        .per_feed_status
                        .iter()
                        .filter(|s| !s.ok)
                        .map(|s| s.feed.clone())
                        .collect(),
                });
                outcome.articles
            }
            Err(e) => {
                events.push(PipelineEvent::FetchFailed {
                    error: format!("{e:#}"),
                });
                Vec::new()
            }
        };
        if self.config.pipeline.extract_pool && !fetched.is_empty() {
            self.extractor
                .extract_batch(fetched, &self.config.pipeline.extract)
                .await
        } else {
            fetched.into_iter().map(ExtractedArticle::from).collect()
        }
    }

    /// Extract a topic's own resource; on failure build a body-less stub from the topic.
    /// The flag tells whether real content was obtained.
    async fn primary_source(
        &self,
        topic: &Topic,
        url: &str,
        events: &mut Vec<PipelineEvent>,
    ) -> (ExtractedArticle, bool) {
        let mut stub = SourceArticle::new(topic.title.clone(), url, PRIMARY_STUB_FEED);
        stub.snippet = topic.description().map(str::to_string);

        let ex = self.extractor.extract(url).await;
        if ex.success {
            if let Some(t) = ex.title.clone().filter(|t| !t.trim().is_empty()) {
                stub.title = t;
            }
            let article = apply_extraction(stub, ex, self.config.pipeline.extract.max_content_length);
            let ok = article.extraction_success;
            return (article, ok);
        }
        events.push(PipelineEvent::PrimaryExtractionFailed {
            topic: topic.title.clone(),
            url: url.to_string(),
            error: ex.error.unwrap_or_else(|| "extraction failed".to_string()),
        });
        (ExtractedArticle::from(stub), false)
    }

    /// One web search per unmatched topic; URL-bearing hits become synthetic sources.
    async fn enrich_unmatched(
        &self,
        unmatched: &[String],
        pool: &mut Vec<ExtractedArticle>,
        events: &mut Vec<PipelineEvent>,
    ) {
        let cfg = &self.config.pipeline;
        let mut known: HashSet<String> = pool.iter().map(|a| normalize_url(a.url())).collect();
        for (i, title) in unmatched.iter().enumerate() {
            if i > 0 && cfg.enrichment_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(cfg.enrichment_delay_ms)).await;
            }
            let raw = match self.search.search(&format!("{title} latest news")).await {
                Ok(raw) => raw,
                Err(e) => {
                    events.push(PipelineEvent::EnrichmentFailed {
                        topic: title.clone(),
                        error: format!("{e:#}"),
                    });
                    continue;
                }
            };
            if has_no_result_marker(&raw) {
                continue;
            }
            let mut added = 0;
            for hit in parse_search_hits(&raw)
                .into_iter()
                .take(cfg.enrichment_max_results)
            {
                if known.insert(normalize_url(&hit.url)) {
                    pool.push(ExtractedArticle::from(hit.into_article()));
                    added += 1;
                }
            }
            if added > 0 {
                events.push(PipelineEvent::EnrichmentAdded {
                    topic: title.clone(),
                    sources: added,
                });
            }
        }
    }
}
