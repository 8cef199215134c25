//! Shared text normalization for querying and indexing.
//!
//! The query processor and the lead indexer must agree on what a token is,
//! otherwise index lookups silently miss. Both sides go through this module.

use fxhash::FxHashSet;
use once_cell::sync::Lazy;
use regex::Regex;

/// Words excluded from terms and index tokens.
pub static STOP_WORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "up", "about", "into", "through", "during", "before", "after", "above", "below",
        "between", "among", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "can",
    ]
    .into_iter()
    .collect()
});

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\w\s-]"#).expect("valid regex"));
static NON_WORD_KEEP_QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s"-]"#).expect("valid regex"));
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

fn normalize_with(pattern: &Regex, text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = pattern.replace_all(&lowered, " ");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Lowercase, strip everything except word characters, whitespace, and
/// hyphens, and collapse whitespace.
pub fn normalize(text: &str) -> String {
    normalize_with(&NON_WORD, text)
}

/// Like [`normalize`] but keeps double quotes so phrase markers survive
/// query cleaning.
pub fn normalize_keeping_quotes(text: &str) -> String {
    normalize_with(&NON_WORD_KEEP_QUOTES, text)
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Split normalized text into tokens: at least two characters, no stop
/// words, deduplicated preserving first occurrence.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    text.split_whitespace()
        .filter(|t| t.chars().count() >= 2 && !is_stop_word(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}
