// tests/ingest_rss.rs
use anyhow::Result;
use async_trait::async_trait;

use topic_grounding::ingest::providers::RssFeedProvider;
use topic_grounding::ingest::types::{FeedProvider, FetchOptions, SourceFetcher};
use topic_grounding::ingest::MultiFeedFetcher;
use topic_grounding::SourceArticle;

const TECH_XML: &str = include_str!("fixtures/tech_rss.xml");

struct DownFeed;

#[async_trait]
impl FeedProvider for DownFeed {
    async fn fetch(&self, _opts: &FetchOptions) -> Result<Vec<SourceArticle>> {
        anyhow::bail!("503 service unavailable")
    }

    fn name(&self) -> &str {
        "down"
    }
}

#[test]
fn fixture_parses_authors_dates_and_skips_linkless_items() {
    let p = RssFeedProvider::from_fixture_str("systems", TECH_XML);
    let items = p.parse_items_from_str(TECH_XML).expect("rss parse ok");
    assert_eq!(items.len(), 3);

    let rust = &items[0];
    assert_eq!(rust.author.as_deref(), Some("Release Team"));
    assert_eq!(rust.date.as_deref(), Some("2024-10-17T14:00:00Z"));
    assert_eq!(
        rust.snippet.as_deref(),
        Some("The Rust team has published a new stable release.")
    );

    // offset dates are normalised to UTC
    assert_eq!(items[1].date.as_deref(), Some("2024-08-13T07:30:00Z"));
    assert_eq!(items[1].title, "Kubernetes 1.31 autoscaling changes");
    // unparseable date is dropped, not an error
    assert!(items[2].date.is_none());
}

#[tokio::test]
async fn keyword_filter_applies_per_feed() {
    let p = RssFeedProvider::from_fixture_str("systems", TECH_XML);
    let opts = FetchOptions {
        keywords: vec!["kubernetes".into()],
        ..Default::default()
    };
    let items = p.fetch(&opts).await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].url.ends_with("k8s-1-31"));
}

#[tokio::test]
async fn one_failing_feed_does_not_abort_the_fetch() {
    let fetcher = MultiFeedFetcher::new(vec![
        Box::new(DownFeed),
        Box::new(RssFeedProvider::from_fixture_str("systems", TECH_XML)),
    ]);
    assert_eq!(fetcher.feed_count(), 2);

    let out = fetcher
        .fetch_all_sources(&FetchOptions::default())
        .await
        .expect("all-settled fetch never fails as a whole");

    // trailing-slash duplicate collapses into the first occurrence
    assert_eq!(out.articles.len(), 2);
    assert_eq!(out.total_count, 2);
    assert_eq!(out.per_feed_status.len(), 2);

    let down = &out.per_feed_status[0];
    assert!(!down.ok);
    assert!(down.error.as_deref().unwrap_or_default().contains("503"));
    let up = &out.per_feed_status[1];
    assert!(up.ok);
    assert_eq!(up.count, 3);
}

#[tokio::test]
async fn limit_caps_after_dedup() {
    let fetcher = MultiFeedFetcher::new(vec![Box::new(RssFeedProvider::from_fixture_str(
        "systems", TECH_XML,
    ))]);
    let out = fetcher
        .fetch_all_sources(&FetchOptions {
            limit: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(out.articles.len(), 1);
    assert!(out.articles[0].title.starts_with("Rust 1.82"));
}
