// src/bin/grounding_probe.rs
//! Run the pre-generation checks for topics given on the command line and print the
//! result as JSON.
//!
//! ```text
//! BRAVE_API_KEY=... grounding_probe "Rust 2024 edition" "ChatGPT 9.0"
//! ```
//!
//! `GROUNDING_METRICS=1` also dumps the Prometheus series to stderr.
use anyhow::Context;
use std::sync::Arc;
use topic_grounding::ingest::config::{build_fetcher, load_feeds_default};
use topic_grounding::ingest::extract::HttpExtractor;
use topic_grounding::ingest::search::BraveWebSearch;
use topic_grounding::metrics::Metrics;
use topic_grounding::outcome::JsonlOutcomeSink;
use topic_grounding::{GroundingConfig, PreGenerationPipeline, PreGenerationRequest};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grounding=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let topics: Vec<String> = std::env::args().skip(1).collect();
    if topics.is_empty() {
        anyhow::bail!("usage: grounding_probe <topic> [<topic> ...]");
    }

    let metrics = match std::env::var("GROUNDING_METRICS").as_deref() {
        Ok("1") | Ok("true") => Some(Metrics::init()?),
        _ => None,
    };

    let config = GroundingConfig::load_default()?;
    let api_key = std::env::var("BRAVE_API_KEY").context("BRAVE_API_KEY is not set")?;
    let search = Arc::new(BraveWebSearch::new(api_key)?);

    let feeds = load_feeds_default()?;
    let client = reqwest::Client::builder()
        .user_agent("topic-grounding/0.1")
        .timeout(std::time::Duration::from_secs(10))
        .build()?;
    let fetcher = Arc::new(build_fetcher(&feeds, client));
    let extractor = Arc::new(HttpExtractor::new()?);

    let mut pipeline = PreGenerationPipeline::new(search, fetcher, extractor, config);
    if let Ok(path) = std::env::var("GROUNDING_OUTCOMES_PATH") {
        pipeline = pipeline.with_outcome_sink(Arc::new(JsonlOutcomeSink::new(path)));
    }

    let result = pipeline
        .run_pre_generation_checks(PreGenerationRequest::new(topics))
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    Ok(())
}
