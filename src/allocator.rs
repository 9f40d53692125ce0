// src/allocator.rs
//! Partition-then-allocate source allocation across audiences.
//!
//! 1) Partition: every source goes to exactly one audience, the one whose topics
//!    score it highest (first audience wins ties). A source that is the declared
//!    resource of a single-audience topic is pinned to that audience. Sources below
//!    `partition_floor` for every audience are dealt round-robin.
//! 2) Allocate: for each audience, for each of its topics, pick up to
//!    `sources_per_pair` partition sources by descending relevance, unused-by-this-
//!    audience first. A topic left empty takes the partition's best positive source;
//!    failing that, the best pool-wide source at or above the floor. That borrow
//!    counts as reuse whether or not the owning audience allocated the url.
//! 3) Diversity: 100 - (urls shared by >1 audience / unique allocated urls) * 100.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::matcher::ScoredSource;
use crate::relevance::{calculate_relevance_score_with, ScoringWeights};
use crate::source::{normalize_url, urls_match, ExtractedArticle};
use crate::topic::{AudienceConfig, Topic};

pub const PARTITION_FLOOR: f32 = 0.1;
pub const DEFAULT_SOURCES_PER_PAIR: usize = 3;
pub const DEFAULT_MIN_SOURCES_PER_PAIR: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub sources_per_pair: usize,
    /// Below this, a source counts as unrelated to an audience.
    pub partition_floor: f32,
    /// Allocations with fewer sources are reported as under-sourced.
    pub min_sources_per_pair: usize,
    pub weights: ScoringWeights,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            sources_per_pair: DEFAULT_SOURCES_PER_PAIR,
            partition_floor: PARTITION_FLOOR,
            min_sources_per_pair: DEFAULT_MIN_SOURCES_PER_PAIR,
            weights: ScoringWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAllocation {
    pub topic: String,
    pub audience_id: String,
    pub audience_name: String,
    /// At most `sources_per_pair`, best first. Empty means "no sources" explicitly.
    pub sources: Vec<ScoredSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_source: Option<ExtractedArticle>,
    pub relevance_score: f32,
    /// Some source here was already allocated to an earlier pair.
    pub has_reused_sources: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderSourcedTopic {
    pub topic: String,
    pub audience_id: String,
    pub source_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudiencePartition {
    pub audience_id: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    /// Audience order, then topic order.
    pub allocations: Vec<SourceAllocation>,
    /// 0..=100; 100 means no url is shared between audiences.
    pub diversity_score: f32,
    pub reused_urls: Vec<String>,
    pub under_sourced_topics: Vec<UnderSourcedTopic>,
    /// One entry per audience, including audiences without topics.
    pub partitions: Vec<AudiencePartition>,
}

impl AllocationResult {
    pub fn for_audience<'a>(&'a self, audience_id: &'a str) -> impl Iterator<Item = &'a SourceAllocation> {
        self.allocations
            .iter()
            .filter(move |a| a.audience_id == audience_id)
    }

    /// Normalised urls allocated to one audience.
    pub fn urls_for_audience(&self, audience_id: &str) -> HashSet<String> {
        self.for_audience(audience_id)
            .flat_map(|a| a.sources.iter().map(|s| normalize_url(s.article.url())))
            .collect()
    }
}

/// 100 - shared/unique * 100, floored at 0. No allocated urls scores 100.
pub fn diversity_score(cross_audience_reuse: usize, unique_urls: usize) -> f32 {
    if unique_urls == 0 {
        return 100.0;
    }
    (100.0 - (cross_audience_reuse as f32 / unique_urls as f32) * 100.0).max(0.0)
}

/// Indices of the audiences a topic belongs to. An explicit map entry wins over the
/// topic's own tag; untagged topics and unknown audience ids belong to every audience.
fn owning_audiences(
    topic: &Topic,
    audiences: &[AudienceConfig],
    topic_audience_map: Option<&HashMap<String, String>>,
) -> Vec<usize> {
    let tag = topic_audience_map
        .and_then(|m| m.get(&topic.title))
        .or(topic.audience_id.as_ref());
    match tag.and_then(|id| audiences.iter().position(|a| &a.id == id)) {
        Some(idx) => vec![idx],
        None => (0..audiences.len()).collect(),
    }
}

fn topic_score(topic: &Topic, source: &ExtractedArticle, weights: &ScoringWeights) -> f32 {
    if let Some(r) = topic.resource.as_deref().filter(|r| !r.trim().is_empty()) {
        if urls_match(source.url(), r) {
            return 1.0;
        }
    }
    calculate_relevance_score_with(&topic.title, source, weights)
}

fn sort_desc(v: &mut [(usize, f32)]) {
    v.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
}

pub fn allocate_sources_to_audiences(
    topics: &[Topic],
    audiences: &[AudienceConfig],
    sources: &[ExtractedArticle],
    topic_audience_map: Option<&HashMap<String, String>>,
    cfg: &AllocatorConfig,
) -> AllocationResult {
    let n_aud = audiences.len();
    if n_aud == 0 {
        return AllocationResult {
            allocations: Vec::new(),
            diversity_score: 100.0,
            reused_urls: Vec::new(),
            under_sourced_topics: Vec::new(),
            partitions: Vec::new(),
        };
    }

    // topic ownership
    let mut audience_topics: Vec<Vec<usize>> = vec![Vec::new(); n_aud];
    let mut single_owner: Vec<Option<usize>> = Vec::with_capacity(topics.len());
    for (ti, t) in topics.iter().enumerate() {
        let owners = owning_audiences(t, audiences, topic_audience_map);
        single_owner.push(if owners.len() == 1 { Some(owners[0]) } else { None });
        for ai in owners {
            audience_topics[ai].push(ti);
        }
    }

    // (1) partition
    let mut partition: Vec<Vec<usize>> = vec![Vec::new(); n_aud];
    let mut unrelated: Vec<usize> = Vec::new();
    for (si, s) in sources.iter().enumerate() {
        let pinned = topics.iter().enumerate().find_map(|(ti, t)| {
            let r = t.resource.as_deref().filter(|r| !r.trim().is_empty())?;
            if urls_match(s.url(), r) {
                single_owner[ti]
            } else {
                None
            }
        });
        if let Some(ai) = pinned {
            partition[ai].push(si);
            continue;
        }

        let mut best: Option<(usize, f32)> = None;
        for (ai, tis) in audience_topics.iter().enumerate() {
            if tis.is_empty() {
                continue;
            }
            let score = tis
                .iter()
                .map(|&ti| topic_score(&topics[ti], s, &cfg.weights))
                .fold(0.0f32, f32::max);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((ai, score));
            }
        }
        match best {
            Some((ai, score)) if score >= cfg.partition_floor => partition[ai].push(si),
            _ => unrelated.push(si),
        }
    }
    let rr_targets: Vec<usize> = {
        let with_topics: Vec<usize> = (0..n_aud)
            .filter(|&ai| !audience_topics[ai].is_empty())
            .collect();
        if with_topics.is_empty() {
            (0..n_aud).collect()
        } else {
            with_topics
        }
    };
    for (k, si) in unrelated.into_iter().enumerate() {
        partition[rr_targets[k % rr_targets.len()]].push(si);
    }

    // (2) allocate
    let per_pair = cfg.sources_per_pair.max(1);
    let mut used_by: Vec<HashSet<usize>> = vec![HashSet::new(); n_aud];
    // sources taken from another audience's partition
    let mut borrowed: Vec<usize> = Vec::new();
    let mut allocations = Vec::new();
    for (ai, aud) in audiences.iter().enumerate() {
        for &ti in &audience_topics[ai] {
            let topic = &topics[ti];
            let mut ranked: Vec<(usize, f32)> = partition[ai]
                .iter()
                .map(|&si| (si, topic_score(topic, &sources[si], &cfg.weights)))
                .collect();
            sort_desc(&mut ranked);

            let relevant = ranked.iter().filter(|(_, s)| *s >= cfg.partition_floor);
            let mut picked: Vec<(usize, f32)> = relevant
                .clone()
                .filter(|(si, _)| !used_by[ai].contains(si))
                .take(per_pair)
                .copied()
                .collect();
            if picked.len() < per_pair {
                let fill: Vec<(usize, f32)> = relevant
                    .filter(|(si, _)| used_by[ai].contains(si))
                    .take(per_pair - picked.len())
                    .copied()
                    .collect();
                picked.extend(fill);
                sort_desc(&mut picked);
            }
            if picked.is_empty() {
                if let Some(&best) = ranked.first().filter(|(_, s)| *s > 0.0) {
                    picked.push(best);
                }
            }
            let mut cross_reuse = false;
            if picked.is_empty() {
                let mut pool_wide: Vec<(usize, f32)> = (0..sources.len())
                    .filter(|si| !partition[ai].contains(si))
                    .map(|si| (si, topic_score(topic, &sources[si], &cfg.weights)))
                    .filter(|(_, s)| *s >= cfg.partition_floor)
                    .collect();
                sort_desc(&mut pool_wide);
                if let Some(&best) = pool_wide.first() {
                    picked.push(best);
                    borrowed.push(best.0);
                    cross_reuse = true;
                }
            }

            let has_reused_sources =
                cross_reuse || picked.iter().any(|(si, _)| used_by[ai].contains(si));
            for (si, _) in &picked {
                used_by[ai].insert(*si);
            }
            let sources_out: Vec<ScoredSource> = picked
                .iter()
                .map(|&(si, score)| ScoredSource {
                    article: sources[si].clone(),
                    score,
                })
                .collect();
            allocations.push(SourceAllocation {
                topic: topic.title.clone(),
                audience_id: aud.id.clone(),
                audience_name: aud.name.clone(),
                primary_source: sources_out.first().map(|s| s.article.clone()),
                relevance_score: sources_out.first().map(|s| s.score).unwrap_or(0.0),
                sources: sources_out,
                has_reused_sources,
            });
        }
    }

    // (3) diversity
    let mut url_order: Vec<String> = Vec::new();
    let mut url_audiences: HashMap<String, HashSet<&str>> = HashMap::new();
    for a in &allocations {
        for s in &a.sources {
            let key = normalize_url(s.article.url());
            let entry = url_audiences.entry(key.clone()).or_insert_with(|| {
                url_order.push(key.clone());
                HashSet::new()
            });
            entry.insert(a.audience_id.as_str());
        }
    }
    // a borrowed url is shared with its owning audience even if the owner never allocated it
    for &si in &borrowed {
        let Some(owner) = partition.iter().position(|p| p.contains(&si)) else {
            continue;
        };
        if let Some(set) = url_audiences.get_mut(&normalize_url(sources[si].url())) {
            set.insert(audiences[owner].id.as_str());
        }
    }
    let reused_urls: Vec<String> = url_order
        .iter()
        .filter(|u| url_audiences.get(*u).is_some_and(|s| s.len() > 1))
        .cloned()
        .collect();
    let diversity = diversity_score(reused_urls.len(), url_order.len());

    let under_sourced_topics = allocations
        .iter()
        .filter(|a| a.sources.len() < cfg.min_sources_per_pair.min(per_pair))
        .map(|a| UnderSourcedTopic {
            topic: a.topic.clone(),
            audience_id: a.audience_id.clone(),
            source_count: a.sources.len(),
        })
        .collect();

    let partitions = audiences
        .iter()
        .enumerate()
        .map(|(ai, a)| AudiencePartition {
            audience_id: a.id.clone(),
            urls: partition[ai]
                .iter()
                .map(|&si| sources[si].url().to_string())
                .collect(),
        })
        .collect();

    AllocationResult {
        allocations,
        diversity_score: diversity,
        reused_urls,
        under_sourced_topics,
        partitions,
    }
}

/// Per-audience rendering of the allocation for the generation layer.
pub fn build_allocation_context(result: &AllocationResult) -> String {
    let mut out = String::from("=== AUDIENCE SOURCE ALLOCATION ===\n");
    let _ = writeln!(out, "Diversity score: {:.0}/100", result.diversity_score);
    let reused: HashSet<String> = result.reused_urls.iter().cloned().collect();

    let mut current: Option<&str> = None;
    for a in &result.allocations {
        if current != Some(a.audience_id.as_str()) {
            current = Some(a.audience_id.as_str());
            let _ = writeln!(out, "\nAUDIENCE: {} ({})", a.audience_name, a.audience_id);
            let _ = writeln!(
                out,
                "  Use ONLY the sources listed under each topic for this audience."
            );
        }
        let _ = writeln!(out, "  TOPIC: \"{}\"", a.topic);
        if a.sources.is_empty() {
            let _ = writeln!(
                out,
                "    - no sources allocated: do not write about this topic for this audience"
            );
            continue;
        }
        for s in &a.sources {
            let shared = if reused.contains(&normalize_url(s.article.url())) {
                " (shared with another audience)"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "    - {} ({}) [relevance {:.2}]{}",
                s.article.title(),
                s.article.url(),
                s.score,
                shared
            );
        }
    }
    out
}
