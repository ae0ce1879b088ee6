//! Normalised fuzzy string similarity.
//!
//! Scores are on a 0–100 scale. `ratio` is the indel similarity
//! `2 * matches / (len_a + len_b)` computed over characters; the partial and
//! token-set variants build on it.

use std::collections::BTreeSet;

use similar::TextDiff;

use crate::corpus::sanitize;

/// Case-fold, fold typographic punctuation and collapse whitespace.
pub fn normalize(text: &str) -> String {
    sanitize(text).to_lowercase()
}

/// Indel similarity of two strings, 0–100. Two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 100.0,
        (true, false) | (false, true) => 0.0,
        _ => f64::from(TextDiff::from_chars(a, b).ratio()) * 100.0,
    }
}

/// Best `ratio` of the shorter string against any equally long window of the longer one.
///
/// Windows are anchored where a word starts or where the shorter string's
/// first character occurs, which covers every alignment that can score well.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (needle, haystack) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if needle.is_empty() {
        return if haystack.is_empty() { 100.0 } else { 0.0 };
    }

    let hay: Vec<(usize, char)> = haystack.char_indices().collect();
    let n = needle.chars().count();
    if hay.len() == n {
        return ratio(needle, haystack);
    }
    let first = needle.chars().next().unwrap_or(' ');

    let mut best = 0.0f64;
    for start in 0..=(hay.len() - n) {
        let (byte_start, ch) = hay[start];
        let word_start = start == 0 || hay[start - 1].1.is_whitespace();
        if !(word_start || ch == first) {
            continue;
        }
        let byte_end = hay.get(start + n).map(|(i, _)| *i).unwrap_or(haystack.len());
        let score = ratio(needle, &haystack[byte_start..byte_end]);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

fn tokens(text: &str) -> BTreeSet<&str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn join(parts: &[&str]) -> String {
    parts.join(" ")
}

/// Token-set similarity: order and repetition insensitive, and a full score
/// when one side's tokens are a subset of the other's.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = ta.intersection(&tb).copied().collect();
    let only_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let only_b: Vec<&str> = tb.difference(&ta).copied().collect();

    if !sect.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let combined_a = join(&[sect.as_slice(), only_a.as_slice()].concat());
    let combined_b = join(&[sect.as_slice(), only_b.as_slice()].concat());
    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty() {
        let sect = join(&sect);
        best = best.max(ratio(&sect, &combined_a)).max(ratio(&sect, &combined_b));
    }
    best
}

/// `ratio` after sorting each side's tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sorted = |s: &str| {
        let mut t: Vec<&str> = s.split_whitespace().collect();
        t.sort_unstable();
        t.join(" ")
    };
    ratio(&sorted(a), &sorted(b))
}

/// Whether `term` is fuzzily present in an already normalised answer.
pub fn keyword_hit(normalized_answer: &str, term: &str, threshold: f64) -> bool {
    let term = normalize(term);
    if term.is_empty() || normalized_answer.is_empty() {
        return false;
    }
    let score = partial_ratio(&term, normalized_answer).max(token_set_ratio(normalized_answer, &term));
    score >= threshold
}

/// Similarity of two question prompts on a 0–1 scale.
pub fn prompt_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize(a), normalize(b));
    ratio(&a, &b).max(token_sort_ratio(&a, &b)) / 100.0
}
