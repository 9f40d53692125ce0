// tests/validator.rs
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use topic_grounding::ingest::types::WebSearch;
use topic_grounding::validator::ValidatorConfig;
use topic_grounding::{Confidence, TopicValidator};

/// Answers by substring of the query; records (query, elapsed) pairs.
struct CannedSearch {
    started: tokio::time::Instant,
    log: Mutex<Vec<(String, Duration)>>,
}

impl CannedSearch {
    fn new() -> Self {
        Self {
            started: tokio::time::Instant::now(),
            log: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebSearch for CannedSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.log
            .lock()
            .push((query.to_string(), self.started.elapsed()));
        if query.contains("Outage") {
            anyhow::bail!("connection reset");
        }
        if query.contains("Zorblax") {
            return Ok("No results found for your query.".into());
        }
        if query.contains("Rust") {
            return Ok([
                "1. Rust 1.80 released (https://github.com/rust-lang/rust)",
                "2. Announced at RustConf (https://techcrunch.com/rust)",
                "3. Rust official blog (https://blog.rust-lang.org)",
                "4. Now available on stable (https://arstechnica.com/rust)",
                "5. Community notes (https://example.test/rust)",
            ]
            .join("\n"));
        }
        Ok("1. A forum post (https://forum.test/x)".into())
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

fn validator(search: Arc<CannedSearch>, stagger_ms: u64) -> TopicValidator {
    TopicValidator::new(
        search,
        ValidatorConfig {
            stagger_ms,
            ..ValidatorConfig::default()
        },
    )
}

#[tokio::test]
async fn search_failure_is_unknown_and_still_valid() {
    let v = validator(Arc::new(CannedSearch::new()), 0);
    let r = v.validate_single_topic("Cloud Outage retrospective").await;
    assert_eq!(r.confidence, Confidence::Unknown);
    assert!(r.is_valid);
    assert!(r.error.as_deref().unwrap_or_default().contains("connection reset"));
}

#[tokio::test]
async fn no_results_is_fictional() {
    let v = validator(Arc::new(CannedSearch::new()), 0);
    let r = v.validate_single_topic("Zorblax quantum toaster").await;
    assert_eq!(r.confidence, Confidence::None);
    assert!(!r.is_valid);
}

#[tokio::test]
async fn version_heuristic_skips_the_search() {
    let search = Arc::new(CannedSearch::new());
    let v = validator(search.clone(), 0);
    let r = v.validate_single_topic("iPhone 25 launch").await;
    assert_eq!(r.confidence, Confidence::None);
    assert_eq!(r.suggested_alternative.as_deref(), Some("iPhone 17"));
    assert!(search.log.lock().is_empty());
}

#[tokio::test]
async fn well_covered_topic_is_high_confidence() {
    let v = validator(Arc::new(CannedSearch::new()), 0);
    let r = v.validate_single_topic("Rust 1.80").await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.result_count, 5);
}

#[tokio::test(start_paused = true)]
async fn batch_keeps_input_order_and_staggers_starts() {
    let search = Arc::new(CannedSearch::new());
    let v = validator(search.clone(), 200);
    let topics: Vec<String> = vec![
        "Rust 1.80".into(),
        "Zorblax quantum toaster".into(),
        "Cloud Outage retrospective".into(),
        "Local meetup recap".into(),
    ];
    let batch = v.validate_topics(&topics).await;

    let order: Vec<_> = batch.results.iter().map(|r| r.topic.as_str()).collect();
    assert_eq!(order, topics.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(batch.invalid_topics, vec!["Zorblax quantum toaster".to_string()]);
    assert_eq!(batch.unknown_topics, vec!["Cloud Outage retrospective".to_string()]);
    assert!(!batch.all_valid);
    assert_eq!(batch.results[3].confidence, Confidence::Low);

    let log = search.log.lock();
    assert_eq!(log.len(), 4);
    for (i, (query, at)) in log.iter().enumerate() {
        assert!(query.contains(&topics[i]), "{query}");
        let expected = Duration::from_millis(200 * i as u64);
        assert!(*at >= expected && *at < expected + Duration::from_millis(50), "{i}: {at:?}");
    }
}
