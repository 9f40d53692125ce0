// tests/keywords_relevance.rs
// Hand-picked cases for keyword extraction and the relevance score.

use topic_grounding::keywords::{merge_capped, title_word_set};
use topic_grounding::relevance::{calculate_relevance_score_with, score_breakdown, ScoringWeights};
use topic_grounding::{calculate_relevance_score, extract_keywords, ExtractedArticle, SourceArticle};

fn article(title: &str, url: &str, snippet: &str) -> SourceArticle {
    SourceArticle::new(title, url, "rss").with_snippet(snippet)
}

#[test]
fn keywords_drop_stop_words_short_tokens_and_punctuation() {
    let kw = extract_keywords("The NEW Rust-based DB: what's next for AI & ML?");
    assert_eq!(kw, vec!["rust-based".to_string(), "next".to_string()]);
}

#[test]
fn keywords_are_unique_in_first_seen_order() {
    assert_eq!(
        extract_keywords("tokio tokio runtime Tokio"),
        vec!["tokio".to_string(), "runtime".to_string()]
    );
    assert!(extract_keywords("the and for").is_empty());
}

#[test]
fn merged_keyword_lists_are_capped() {
    let merged = merge_capped(vec!["Rust", "tokio", "rust", "axum", "serde"], 3);
    assert_eq!(merged, vec!["Rust", "tokio", "axum"]);
}

#[test]
fn title_words_keep_version_numbers() {
    let w = title_word_set("iOS 18 beta 2");
    assert!(w.contains("18"));
    assert!(w.contains("2"));
}

#[test]
fn zero_keywords_scores_zero() {
    let a = article("The news", "https://n.test/the", "the latest");
    assert_eq!(calculate_relevance_score("the latest news", &a), 0.0);
}

#[test]
fn surfaces_are_weighted_independently() {
    let topic = "Kubernetes autoscaling";
    let title_only = article("Kubernetes autoscaling", "https://x.test/a", "");
    let body_only = article("Unrelated", "https://x.test/b", "kubernetes autoscaling");
    let url_only = article("Unrelated", "https://x.test/kubernetes-autoscaling", "");

    assert!((calculate_relevance_score(topic, &title_only) - 0.5).abs() < 1e-6);
    assert!((calculate_relevance_score(topic, &body_only) - 0.3).abs() < 1e-6);
    assert!((calculate_relevance_score(topic, &url_only) - 0.2).abs() < 1e-6);

    let b = score_breakdown(topic, &url_only, &ScoringWeights::default());
    assert_eq!((b.keywords, b.title_hits, b.body_hits, b.url_hits), (2, 0, 0, 2));
}

#[test]
fn partial_overlap_is_proportional() {
    let a = article("Kubernetes release notes", "https://x.test/notes", "");
    // 1 of 2 keywords in title
    assert!((calculate_relevance_score("Kubernetes autoscaling", &a) - 0.25).abs() < 1e-6);
}

#[test]
fn extracted_content_counts_as_body() {
    let a: ExtractedArticle = SourceArticle::new("Unrelated", "https://x.test/z", "rss").into();
    let a = a.with_content("deep dive into kubernetes autoscaling internals");
    assert!((calculate_relevance_score("Kubernetes autoscaling", &a) - 0.3).abs() < 1e-6);
}

#[test]
fn custom_weights_are_clamped_and_applied() {
    let w = ScoringWeights::new(2.0, f32::NAN, -1.0);
    assert_eq!((w.title, w.body, w.url), (1.0, 0.0, 0.0));
    let a = article("Kubernetes autoscaling", "https://x.test/kubernetes", "kubernetes");
    assert_eq!(calculate_relevance_score_with("Kubernetes autoscaling", &a, &w), 1.0);
}
