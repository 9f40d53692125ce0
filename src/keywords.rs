// src/keywords.rs
//! Keyword extraction: lowercase, strip punctuation (hyphens survive), split on
//! whitespace, drop short tokens and stop-words.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;

/// Tokens of this length or shorter are discarded.
pub const MIN_KEYWORD_LEN: usize = 2;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "been", "being",
    "have", "has", "had", "will", "would", "could", "should", "can", "may", "might", "must",
    "what", "when", "where", "which", "who", "whom", "why", "how", "into", "onto", "about",
    "than", "then", "them", "they", "their", "there", "these", "those", "its", "our", "your",
    "you", "not", "but", "all", "any", "more", "most", "some", "such", "also", "just", "over",
    "only", "very", "out", "own", "same", "too", "each", "few", "both", "does", "did", "doing",
    "here", "his", "her", "hers", "him", "she", "off", "once", "under", "until", "while",
    "again", "further", "between", "through", "during", "before", "after", "above", "below",
    "new", "latest", "news", "how-to", "via", "per", "get", "gets", "got", "use", "using",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceCell<HashSet<&'static str>> = OnceCell::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

pub fn is_stop_word(token: &str) -> bool {
    stop_words().contains(token)
}

/// Replace everything that is not a word char, whitespace or hyphen with a space.
fn strip_punctuation(text: &str) -> String {
    static RE_PUNCT: OnceCell<Regex> = OnceCell::new();
    let re = RE_PUNCT.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap());
    re.replace_all(text, " ").into_owned()
}

/// Extract content keywords from `text`.
///
/// Order of first appearance is kept; repeated tokens are reported once so that
/// overlap fractions are not skewed by repetition.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = strip_punctuation(&lowered);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in cleaned.split_whitespace() {
        let token = raw.trim_matches('-');
        if token.chars().count() <= MIN_KEYWORD_LEN || is_stop_word(token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

/// Word set used for title similarity: lowercased, punctuation stripped, stop-words kept out.
/// Short tokens are kept here (version numbers like "4" matter for near-duplicate checks).
pub fn title_word_set(title: &str) -> HashSet<String> {
    let lowered = title.to_lowercase();
    strip_punctuation(&lowered)
        .split_whitespace()
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty() && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Merge keyword lists preserving first-seen order, case-insensitive dedup, capped at `cap`.
pub fn merge_capped<I, S>(lists: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in lists {
        if out.len() >= cap {
            break;
        }
        let t = item.as_ref().trim();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.to_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}
