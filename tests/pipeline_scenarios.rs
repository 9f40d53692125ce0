// tests/pipeline_scenarios.rs
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use topic_grounding::events::PipelineEvent;
use topic_grounding::ingest::types::{
    ArticleExtractor, Extraction, FeedStatus, FetchOptions, FetchOutcome, SourceFetcher, WebSearch,
};
use topic_grounding::outcome::{JsonlOutcomeSink, OutcomeRecord};
use topic_grounding::pipeline::PRIMARY_STUB_FEED;
use topic_grounding::{
    AudienceConfig, BlockReason, Confidence, ExtractedArticle, GroundingConfig,
    PreGenerationPipeline, PreGenerationRequest, SourceArticle, Topic, TopicInput,
};

// --- collaborators ---

#[derive(Default)]
struct ScriptedSearch {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedSearch {
    fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl WebSearch for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.calls.lock().push(query.to_string());
        if self.fail {
            anyhow::bail!("429 rate limited");
        }
        if query.contains("fictional product v99") {
            return Ok(format!("No results found for \"{query}\""));
        }
        if let Some(topic) = query.strip_suffix(" latest news") {
            let slug = topic.to_lowercase().replace(' ', "-");
            return Ok(format!(
                "1. **{topic} explained** (https://search.test/{slug})\n   A deep dive into {topic}.\n"
            ));
        }
        Ok("1. **Launch post** (https://github.com/org/repo)\n   officially released\n\
            2. **Coverage** (https://press.test/coverage)\n   announced today\n"
            .to_string())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct StaticFetcher {
    articles: Vec<SourceArticle>,
    statuses: Vec<FeedStatus>,
    calls: Mutex<Vec<FetchOptions>>,
}

impl StaticFetcher {
    fn with(articles: Vec<SourceArticle>) -> Self {
        Self {
            articles,
            ..Default::default()
        }
    }

    fn all_feeds_down() -> Self {
        Self {
            statuses: ["hackernews", "lobsters", "reddit"]
                .iter()
                .map(|f| FeedStatus {
                    feed: f.to_string(),
                    ok: false,
                    count: 0,
                    error: Some("connection refused".into()),
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch_all_sources(&self, opts: &FetchOptions) -> Result<FetchOutcome> {
        self.calls.lock().push(opts.clone());
        Ok(FetchOutcome {
            articles: self.articles.clone(),
            per_feed_status: self.statuses.clone(),
            total_count: self.articles.len(),
        })
    }
}

#[derive(Default)]
struct MapExtractor {
    pages: HashMap<String, String>,
}

impl MapExtractor {
    fn with_page(url: &str, body: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(url.to_string(), body.to_string());
        Self { pages }
    }
}

#[async_trait]
impl ArticleExtractor for MapExtractor {
    async fn extract(&self, url: &str) -> Extraction {
        match self.pages.get(url) {
            Some(body) => Extraction {
                content: Some(body.clone()),
                title: None,
                success: true,
                error: None,
            },
            None => Extraction::failed("404"),
        }
    }
}

fn test_config() -> GroundingConfig {
    let mut cfg = GroundingConfig::default();
    cfg.validator.stagger_ms = 0;
    cfg.pipeline.enrichment_delay_ms = 0;
    cfg.pipeline.extract.delay_ms = 0;
    cfg
}

fn pipeline(
    search: Arc<ScriptedSearch>,
    fetcher: Arc<StaticFetcher>,
    extractor: MapExtractor,
) -> PreGenerationPipeline {
    PreGenerationPipeline::new(search, fetcher, Arc::new(extractor), test_config())
}

fn art(title: &str, url: &str) -> SourceArticle {
    SourceArticle::new(title, url, "hackernews")
}

// --- scenarios ---

#[tokio::test]
async fn impossible_version_blocks_without_network() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::with(vec![art("ChatGPT news", "https://ai.test/chatgpt")]));
    let p = pipeline(search.clone(), fetcher.clone(), MapExtractor::default());

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new(["ChatGPT 9.0"]))
        .await;

    assert!(!r.can_proceed);
    assert_eq!(r.block_reason, Some(BlockReason::AllTopicsFictional));
    assert!(r.block_reason.unwrap().to_string().contains("fictional"));
    assert_eq!(r.validated_topics[0].confidence, Confidence::None);
    assert_eq!(r.suggested_alternatives, vec!["ChatGPT 5".to_string()]);
    assert!(r.user_message.unwrap().contains("ChatGPT 9.0"));
    assert!(search.calls().is_empty(), "heuristic must short-circuit search");
    assert!(fetcher.calls.lock().is_empty());
}

#[tokio::test]
async fn one_fictional_topic_is_filtered_and_run_proceeds() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::with(vec![
        art("Claude 3 capabilities overview", "https://ai.test/claude-3"),
        art("Gardening in spring", "https://garden.test/spring"),
    ]));
    let p = pipeline(search.clone(), fetcher, MapExtractor::default());

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new([
            "Claude 3 capabilities",
            "fictional product v99",
        ]))
        .await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    assert_eq!(r.invalid_topics, vec!["fictional product v99".to_string()]);
    // fictional topics are neither matched nor enriched
    assert_eq!(r.source_mappings.len(), 1);
    assert!(r.mapping_for("Claude 3 capabilities").unwrap().has_match);
    assert!(search.calls().iter().all(|q| !q.ends_with("latest news")));
    assert!(r.user_message.unwrap().contains("fictional product v99"));
}

#[tokio::test]
async fn empty_feeds_block_regardless_of_validity() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::all_feeds_down());
    let p = pipeline(search, fetcher, MapExtractor::default());

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new(["Rust 2024 edition"]))
        .await;

    assert!(!r.can_proceed);
    assert_eq!(r.block_reason, Some(BlockReason::NoSourcesAvailable));
    assert!(r.invalid_topics.is_empty());
    assert!(r.events.iter().any(|e| matches!(
        e,
        PipelineEvent::SourcesCollected { failed_feeds, .. } if failed_feeds.len() == 3
    )));
}

#[tokio::test]
async fn empty_topic_list_blocks_before_any_call() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::default());
    let p = pipeline(search.clone(), fetcher, MapExtractor::default());

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new(Vec::<String>::new()))
        .await;
    assert_eq!(r.block_reason, Some(BlockReason::NoTopics));
    assert!(search.calls().is_empty());
}

#[tokio::test]
async fn unavailable_validation_is_assumed_valid() {
    let search = Arc::new(ScriptedSearch::failing());
    let fetcher = Arc::new(StaticFetcher::default());
    let p = pipeline(search, fetcher, MapExtractor::default());

    let req = PreGenerationRequest::new(["Rust 2024 edition"])
        .with_sources(vec![art("Rust 2024 edition is out", "https://blog.rust.test/2024").into()]);
    let r = p.run_pre_generation_checks(req).await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    assert_eq!(r.validated_topics[0].confidence, Confidence::Unknown);
    assert!(r.validated_topics[0].is_valid);
    assert!(r.invalid_topics.is_empty());
}

#[tokio::test]
async fn unmatched_topic_is_enriched_from_search_and_rematched() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::with(vec![art(
        "Gardening in spring",
        "https://garden.test/spring",
    )]));
    let p = pipeline(search.clone(), fetcher, MapExtractor::default());

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new(["Zig comptime"]))
        .await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    let m = r.mapping_for("Zig comptime").unwrap();
    assert!(m.has_match);
    assert_eq!(m.matched_sources[0].article.url(), "https://search.test/zig-comptime");
    assert_eq!(m.matched_sources[0].article.origin_feed(), "web_search");
    assert_eq!(r.enriched_sources.len(), 2);
    assert!(search.calls().contains(&"Zig comptime latest news".to_string()));
}

#[tokio::test]
async fn pre_sourced_topic_skips_validation_and_cites_primary() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::with(vec![art(
        "Rust compiler performance",
        "https://perf.test/rustc",
    )]));
    let launch = "https://vendor.test/blog/launch";
    let extractor = MapExtractor::with_page(launch, "Full launch announcement text.");
    let p = pipeline(search.clone(), fetcher, extractor);

    let topics: Vec<TopicInput> = vec![
        Topic::new("Acme Widgets launch").with_resource(launch).into(),
        "Rust compiler performance".into(),
    ];
    let r = p
        .run_pre_generation_checks(PreGenerationRequest {
            topics,
            ..Default::default()
        })
        .await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    assert_eq!(r.validated_topics[0].confidence, Confidence::High);
    assert!(search.calls().iter().all(|q| !q.contains("Acme")));
    let m = r.mapping_for("Acme Widgets launch").unwrap();
    assert_eq!(m.relevance_score, 1.0);
    assert_eq!(m.matched_sources[0].article.url(), launch);
    assert!(m.matched_sources[0].article.extraction_success);
    assert!(r.topic_source_context.contains("MANDATORY citation"));
}

#[tokio::test]
async fn failed_primary_extraction_leaves_a_stub_that_does_not_count_as_grounding() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::all_feeds_down());
    let p = pipeline(search, fetcher, MapExtractor::default());

    let topic = Topic::new("Acme Widgets launch")
        .with_resource("https://vendor.test/blog/launch")
        .with_summary("Acme ships its widget line");
    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new([topic]))
        .await;

    assert_eq!(r.block_reason, Some(BlockReason::NoSourcesAvailable));
    let stub = &r.enriched_sources[0];
    assert_eq!(stub.origin_feed(), PRIMARY_STUB_FEED);
    assert_eq!(stub.body(), "Acme ships its widget line");
    assert!(r
        .events
        .iter()
        .any(|e| matches!(e, PipelineEvent::PrimaryExtractionFailed { .. })));
}

#[tokio::test]
async fn concentrated_allocation_trips_the_diversity_guard() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::default());
    let p = pipeline(search, fetcher, MapExtractor::default());

    let req = PreGenerationRequest::new(["Rust async runtime"])
        .with_audiences(vec![
            AudienceConfig::new("devs", "Developers"),
            AudienceConfig::new("ops", "Operators"),
        ])
        .with_sources(vec![ExtractedArticle::from(art(
            "Rust async runtime news",
            "https://r.test/async",
        ))]);
    let r = p.run_pre_generation_checks(req).await;

    assert!(!r.can_proceed);
    match r.block_reason {
        Some(BlockReason::InsufficientDiversity { score, floor }) => {
            assert_eq!(score, 0.0);
            assert_eq!(floor, 50.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(r.allocation_context.unwrap().contains("shared with another audience"));
}

#[tokio::test]
async fn outcome_is_recorded_as_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outcomes.jsonl");
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::all_feeds_down());
    let p = pipeline(search, fetcher, MapExtractor::default())
        .with_outcome_sink(Arc::new(JsonlOutcomeSink::new(&path)));

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new(["Rust 2024 edition"]))
        .await;
    assert!(!r.can_proceed);

    let line = std::fs::read_to_string(&path).unwrap();
    let rec: OutcomeRecord = serde_json::from_str(line.trim()).unwrap();
    assert!(!rec.can_proceed);
    assert_eq!(rec.block_reason.as_deref(), Some("no_sources_available"));
    assert_eq!(rec.topic_hashes.len(), 1);
    assert!(!line.contains("Rust 2024 edition"));
}

#[tokio::test]
async fn year_after_product_name_is_searched_not_rejected() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::with(vec![art(
        "Gemini 2025 updates roundup",
        "https://ai.test/gemini-2025",
    )]));
    let p = pipeline(search.clone(), fetcher, MapExtractor::default());

    let r = p
        .run_pre_generation_checks(PreGenerationRequest::new(["Gemini 2025 updates"]))
        .await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    assert_eq!(r.validated_topics[0].confidence, Confidence::Low);
    assert!(r.suggested_alternatives.is_empty());
    assert_eq!(search.calls().len(), 1);
    assert!(search.calls()[0].starts_with("\"Gemini 2025 updates\" news"));
}

#[tokio::test]
async fn python_minor_below_ceiling_is_not_fictional() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::default());
    let p = pipeline(search.clone(), fetcher, MapExtractor::default());

    let req = PreGenerationRequest::new(["Python 3.9 end of life", "Python 3.15 features"])
        .with_sources(vec![art("Python 3.9 end of life dates", "https://py.test/eol").into()]);
    let r = p.run_pre_generation_checks(req).await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    assert_eq!(r.invalid_topics, vec!["Python 3.15 features".to_string()]);
    assert_eq!(r.suggested_alternatives, vec!["Python 3.14".to_string()]);
    assert_eq!(search.calls().len(), 1);
}

fn two_audiences() -> Vec<AudienceConfig> {
    vec![
        AudienceConfig::new("devs", "Developers"),
        AudienceConfig::new("ops", "Operators"),
    ]
}

#[tokio::test]
async fn tagged_audiences_with_dedicated_sources_proceed_fully_diverse() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::default());
    let p = pipeline(search, fetcher, MapExtractor::default());

    let topics = vec![
        Topic::new("Rust async runtime").for_audience("devs"),
        Topic::new("WebAssembly component model").for_audience("devs"),
        Topic::new("Kubernetes autoscaling").for_audience("ops"),
        Topic::new("Prometheus alerting rules").for_audience("ops"),
    ];
    let pool: Vec<ExtractedArticle> = [
        ("Rust async runtime benchmarks", "https://pool.test/rust-bench"),
        ("Choosing a Rust async runtime", "https://pool.test/choosing-runtime"),
        ("WebAssembly component model explained", "https://pool.test/wasm-explained"),
        ("Kubernetes autoscaling deep dive", "https://pool.test/k8s-dive"),
        ("Kubernetes autoscaling pitfalls", "https://pool.test/k8s-pitfalls"),
        ("Prometheus alerting rules cookbook", "https://pool.test/prom-cookbook"),
    ]
    .into_iter()
    .map(|(t, u)| art(t, u).into())
    .collect();

    let req = PreGenerationRequest::new(topics)
        .with_audiences(two_audiences())
        .with_sources(pool);
    let r = p.run_pre_generation_checks(req).await;

    assert!(r.can_proceed, "{:?}", r.block_reason);
    let alloc = r.allocation_result.as_ref().unwrap();
    assert_eq!(alloc.diversity_score, 100.0);
    assert!(alloc.reused_urls.is_empty());
    assert!(alloc
        .urls_for_audience("devs")
        .is_disjoint(&alloc.urls_for_audience("ops")));
    assert!(!r.allocation_context.unwrap().contains("shared with another audience"));
}

#[tokio::test]
async fn cross_audience_borrow_is_reported_as_reuse() {
    let search = Arc::new(ScriptedSearch::default());
    let fetcher = Arc::new(StaticFetcher::default());
    let p = pipeline(search, fetcher, MapExtractor::default());

    let pool: Vec<ExtractedArticle> = [
        ("Rust async runtime one", "https://p.test/1"),
        ("Rust async runtime two", "https://p.test/2"),
        ("Rust async runtime three", "https://p.test/3"),
        ("Rust tooling async runtime", "https://p.test/4"),
    ]
    .into_iter()
    .map(|(t, u)| art(t, u).into())
    .collect();
    let req = PreGenerationRequest::new([
        Topic::new("Rust async runtime").for_audience("devs"),
        Topic::new("Rust tooling").for_audience("ops"),
    ])
    .with_audiences(two_audiences())
    .with_sources(pool);
    let r = p.run_pre_generation_checks(req).await;

    // 75 clears the default floor of 50, but the borrow is still visible
    assert!(r.can_proceed, "{:?}", r.block_reason);
    let alloc = r.allocation_result.as_ref().unwrap();
    assert_eq!(alloc.reused_urls, vec!["https://p.test/4".to_string()]);
    assert_eq!(alloc.diversity_score, 75.0);
    assert!(alloc.for_audience("ops").all(|a| a.has_reused_sources));
}
