// src/merger.rs
//! Merge independently generated per-audience topic batches into one list.
//!
//! Balanced merge: group by audience, shuffle audience order, then either
//! (strict) give every audience floor(T/K) first and round-robin the remainder, or
//! (non-strict) round-robin from the start. The output is shuffled again so the
//! audience of origin cannot be read off list position.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::keywords::title_word_set;
use crate::topic::Topic;

pub const DEDUP_SIMILARITY_THRESHOLD: f32 = 0.8;
pub const DEFAULT_TARGET_COUNT: usize = 10;

/// Output of one generation branch for one audience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceBatch {
    pub audience_id: String,
    #[serde(default)]
    pub audience_name: String,
    pub topics: Vec<Topic>,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AudienceBatch {
    pub fn ok(audience_id: impl Into<String>, topics: Vec<Topic>) -> Self {
        Self {
            audience_id: audience_id.into(),
            audience_name: String::new(),
            topics,
            success: true,
            error: None,
        }
    }

    pub fn failed(audience_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            audience_id: audience_id.into(),
            audience_name: String::new(),
            topics: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    pub target_count: usize,
    pub strict_balance: bool,
    pub shuffle_audiences: bool,
    pub shuffle_output: bool,
    /// Fixed seed for reproducible shuffles; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Drop near-duplicate titles across audiences before selecting.
    pub deduplicate: bool,
    pub dedup_threshold: f32,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TARGET_COUNT,
            strict_balance: true,
            shuffle_audiences: true,
            shuffle_output: true,
            seed: None,
            deduplicate: false,
            dedup_threshold: DEDUP_SIMILARITY_THRESHOLD,
        }
    }
}

impl MergerConfig {
    /// No shuffling at all: output order is a pure function of the input.
    pub fn deterministic(target_count: usize) -> Self {
        Self {
            target_count,
            shuffle_audiences: false,
            shuffle_output: false,
            ..Self::default()
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergerResult {
    /// Selected topics, each tagged with its audience of origin.
    pub topics: Vec<Topic>,
    pub per_audience_counts: BTreeMap<String, usize>,
    /// Audience order used for selection (after the audience shuffle).
    pub audience_order: Vec<String>,
    pub failed_audiences: Vec<String>,
    /// Topics available across all successful batches (after dedup).
    pub total_available: usize,
    pub duplicates_removed: usize,
}

/// Successful batches grouped per audience, first-seen order. Topics are re-tagged.
fn group_by_audience(batches: &[AudienceBatch]) -> (Vec<(String, Vec<Topic>)>, Vec<String>) {
    let mut groups: Vec<(String, Vec<Topic>)> = Vec::new();
    let mut failed = Vec::new();
    for b in batches {
        if !b.success {
            failed.push(b.audience_id.clone());
            continue;
        }
        let tagged = b.topics.iter().cloned().map(|mut t| {
            t.audience_id = Some(b.audience_id.clone());
            t
        });
        match groups.iter_mut().find(|(id, _)| *id == b.audience_id) {
            Some((_, ts)) => ts.extend(tagged),
            None => groups.push((b.audience_id.clone(), tagged.collect())),
        }
    }
    groups.retain(|(_, ts)| !ts.is_empty());
    (groups, failed)
}

/// Drop titles that are near-duplicates of an earlier title across groups.
fn dedup_groups(groups: &mut [(String, Vec<Topic>)], threshold: f32) -> usize {
    let mut kept: Vec<HashSet<String>> = Vec::new();
    let mut removed = 0;
    for (_, topics) in groups.iter_mut() {
        topics.retain(|t| {
            let words = title_word_set(&t.title);
            if kept.iter().any(|k| jaccard(k, &words) > threshold) {
                removed += 1;
                false
            } else {
                kept.push(words);
                true
            }
        });
    }
    removed
}

/// Take topics per `quotas` (clamped to availability), then round-robin any
/// shortfall from audiences with leftovers until `target` is reached.
fn select_with_quotas(
    groups: &[(String, Vec<Topic>)],
    quotas: &[usize],
    target: usize,
) -> Vec<Vec<Topic>> {
    let mut taken: Vec<usize> = groups
        .iter()
        .zip(quotas)
        .map(|((_, ts), &q)| q.min(ts.len()))
        .collect();
    let mut total: usize = taken.iter().sum();
    while total < target {
        let mut progressed = false;
        for (i, (_, ts)) in groups.iter().enumerate() {
            if total >= target {
                break;
            }
            if taken[i] < ts.len() {
                taken[i] += 1;
                total += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    groups
        .iter()
        .zip(taken)
        .map(|((_, ts), n)| ts[..n].to_vec())
        .collect()
}

/// Pure round-robin: one topic per audience per pass.
fn select_round_robin(groups: &[(String, Vec<Topic>)], target: usize) -> Vec<Topic> {
    let mut out = Vec::new();
    let longest = groups.iter().map(|(_, ts)| ts.len()).max().unwrap_or(0);
    'passes: for pass in 0..longest {
        for (_, ts) in groups {
            if out.len() >= target {
                break 'passes;
            }
            if let Some(t) = ts.get(pass) {
                out.push(t.clone());
            }
        }
    }
    out
}

fn finish(
    mut topics: Vec<Topic>,
    groups: &[(String, Vec<Topic>)],
    failed_audiences: Vec<String>,
    duplicates_removed: usize,
    cfg: &MergerConfig,
    rng: &mut StdRng,
) -> MergerResult {
    if cfg.shuffle_output {
        topics.shuffle(rng);
    }
    let mut per_audience_counts: BTreeMap<String, usize> =
        groups.iter().map(|(id, _)| (id.clone(), 0)).collect();
    for t in &topics {
        if let Some(id) = &t.audience_id {
            *per_audience_counts.entry(id.clone()).or_insert(0) += 1;
        }
    }
    MergerResult {
        topics,
        per_audience_counts,
        audience_order: groups.iter().map(|(id, _)| id.clone()).collect(),
        failed_audiences,
        total_available: groups.iter().map(|(_, ts)| ts.len()).sum(),
        duplicates_removed,
    }
}

fn prepared_groups(
    batches: &[AudienceBatch],
    cfg: &MergerConfig,
    rng: &mut StdRng,
) -> (Vec<(String, Vec<Topic>)>, Vec<String>, usize) {
    let (mut groups, failed) = group_by_audience(batches);
    let removed = if cfg.deduplicate {
        dedup_groups(&mut groups, cfg.dedup_threshold)
    } else {
        0
    };
    groups.retain(|(_, ts)| !ts.is_empty());
    if cfg.shuffle_audiences {
        groups.shuffle(rng);
    }
    (groups, failed, removed)
}

pub fn merge_topics_with_balance(batches: &[AudienceBatch], cfg: &MergerConfig) -> MergerResult {
    let mut rng = cfg.rng();
    let (groups, failed, removed) = prepared_groups(batches, cfg, &mut rng);
    let target = cfg.target_count;

    let selected: Vec<Topic> = if groups.is_empty() {
        Vec::new()
    } else if cfg.strict_balance {
        let share = target / groups.len();
        let quotas = vec![share; groups.len()];
        select_with_quotas(&groups, &quotas, target)
            .into_iter()
            .flatten()
            .collect()
    } else {
        select_round_robin(&groups, target)
    };

    finish(selected, &groups, failed, removed, cfg, &mut rng)
}

/// Per-audience shares proportional to `weights`. Missing audiences weigh 1.0;
/// negative or non-finite weights count as 0. The rounding remainder goes to the
/// highest weights first.
pub fn weighted_shares(audience_ids: &[String], weights: &HashMap<String, f32>, target: usize) -> Vec<usize> {
    if audience_ids.is_empty() {
        return Vec::new();
    }
    let mut w: Vec<f32> = audience_ids
        .iter()
        .map(|id| weights.get(id).copied().unwrap_or(1.0))
        .map(|x| if x.is_finite() && x > 0.0 { x } else { 0.0 })
        .collect();
    let sum: f32 = w.iter().sum();
    if sum <= 0.0 {
        w = vec![1.0; audience_ids.len()];
    }
    let sum: f32 = w.iter().sum();

    let mut shares: Vec<usize> = w
        .iter()
        .map(|x| ((x / sum) * target as f32).floor() as usize)
        .collect();
    let assigned: usize = shares.iter().sum();
    let mut remainder = target.saturating_sub(assigned);

    let mut by_weight: Vec<usize> = (0..w.len()).collect();
    by_weight.sort_by(|&a, &b| w[b].partial_cmp(&w[a]).unwrap_or(Ordering::Equal));
    while remainder > 0 {
        for &i in &by_weight {
            if remainder == 0 {
                break;
            }
            shares[i] += 1;
            remainder -= 1;
        }
    }
    shares
}

pub fn merge_topics_weighted(
    batches: &[AudienceBatch],
    weights: &HashMap<String, f32>,
    cfg: &MergerConfig,
) -> MergerResult {
    let mut rng = cfg.rng();
    let (groups, failed, removed) = prepared_groups(batches, cfg, &mut rng);
    let ids: Vec<String> = groups.iter().map(|(id, _)| id.clone()).collect();
    let quotas = weighted_shares(&ids, weights, cfg.target_count);
    let selected: Vec<Topic> = select_with_quotas(&groups, &quotas, cfg.target_count)
        .into_iter()
        .flatten()
        .collect();
    finish(selected, &groups, failed, removed, cfg, &mut rng)
}

/// Jaccard similarity of two word sets. Two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    inter as f32 / union as f32
}

pub fn title_similarity(a: &str, b: &str) -> f32 {
    jaccard(&title_word_set(a), &title_word_set(b))
}

/// Keep topics whose title is not more than `threshold` similar to an already-kept
/// title. Returns (kept, removed), both in input order.
pub fn deduplicate_by_similarity(topics: Vec<Topic>, threshold: f32) -> (Vec<Topic>, Vec<Topic>) {
    let mut kept: Vec<Topic> = Vec::new();
    let mut kept_words: Vec<HashSet<String>> = Vec::new();
    let mut removed = Vec::new();
    for t in topics {
        let words = title_word_set(&t.title);
        if kept_words.iter().any(|k| jaccard(k, &words) > threshold) {
            removed.push(t);
        } else {
            kept_words.push(words);
            kept.push(t);
        }
    }
    (kept, removed)
}
