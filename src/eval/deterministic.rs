//! Rule-based scoring from fuzzy term coverage and answer structure.
//!
//! Pure: no I/O, no randomness. This is the baseline whenever semantic
//! scoring is disabled or fails.

use crate::corpus::types::QuestionRecord;
use crate::state::InterviewConfig;

use super::similarity::{keyword_hit, normalize};
use super::{clamp_dimension, round2, DimensionScores, DIMENSION_MAX};

/// Answer text recorded for a skipped question.
pub const SKIP_SENTINEL: &str = "[skipped]";

/// Floor for any non-empty answer, so short answers do not read as blank.
const CLARITY_FLOOR: f64 = 1.2;
const CLARITY_LENGTH_SHARE: f64 = 2.5;
const CLARITY_PER_SENTENCE: f64 = 0.5;
const CLARITY_MAX_SENTENCES: usize = 5;
const HEDGE_PENALTY: f64 = 0.5;
const HEDGE_PENALTY_CAP: f64 = 1.5;

const HEDGE_TERMS: &[&str] = &[
    "i think",
    "i guess",
    "maybe",
    "probably",
    "not sure",
    "kind of",
    "sort of",
    "i believe",
    "perhaps",
    "um",
    "uh",
    "basically",
];

const MAX_FEEDBACK_ITEMS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct DeterministicResult {
    pub scores: DimensionScores,
    pub feedback: String,
}

#[derive(Debug, Clone)]
pub struct DeterministicScorer {
    keyword_threshold: f64,
    strict_keyword_threshold: f64,
    clarity_length_cap: usize,
    depth_per_hit: f64,
}

impl DeterministicScorer {
    pub fn from_config(config: &InterviewConfig) -> Self {
        Self {
            keyword_threshold: config.keyword_threshold,
            strict_keyword_threshold: config.strict_keyword_threshold,
            clarity_length_cap: config.clarity_length_cap.max(1),
            depth_per_hit: config.depth_per_hit,
        }
    }

    pub fn score(&self, answer: &str, question: &QuestionRecord) -> DeterministicResult {
        let ans = normalize(answer);
        if ans.is_empty() || ans == SKIP_SENTINEL {
            return DeterministicResult {
                scores: DimensionScores::ZERO,
                feedback: "No answer given.".to_string(),
            };
        }

        let keyword_hits = hits(&ans, &question.keywords, self.keyword_threshold);
        let element_hits = hits(&ans, &question.expected_elements, self.keyword_threshold);
        let depth_hits = hits(&ans, &question.advanced_keywords, self.keyword_threshold);

        let completeness = if !question.keywords.is_empty() {
            coverage(&keyword_hits, &question.keywords)
        } else {
            coverage(&element_hits, &question.expected_elements)
        };

        let accuracy = if !question.expected_elements.is_empty() {
            coverage(&element_hits, &question.expected_elements)
        } else {
            let strict = hits(&ans, &question.keywords, self.strict_keyword_threshold);
            coverage(&strict, &question.keywords)
        };

        let depth = depth_hits.iter().filter(|h| **h).count() as f64 * self.depth_per_hit;

        let scores = DimensionScores {
            accuracy,
            completeness,
            clarity: self.clarity(&ans),
            depth,
        }
        .clamped();
        let scores = DimensionScores::from_array(scores.as_array().map(round2));

        DeterministicResult {
            scores,
            feedback: feedback(question, &element_hits, &keyword_hits, &depth_hits),
        }
    }

    /// Structural proxy: length up to a cap, sentence count, minus hedging.
    fn clarity(&self, ans: &str) -> f64 {
        let words = ans.split_whitespace().count();
        if words == 0 {
            return 0.0;
        }
        let sentences = ans
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);

        let length = CLARITY_LENGTH_SHARE * (words.min(self.clarity_length_cap) as f64)
            / self.clarity_length_cap as f64;
        let structure = CLARITY_PER_SENTENCE * sentences.min(CLARITY_MAX_SENTENCES) as f64;

        let padded = format!(" {} ", ans.replace(|c: char| c.is_ascii_punctuation() && c != '\'', " "));
        let hedges = HEDGE_TERMS
            .iter()
            .filter(|t| padded.contains(&format!(" {} ", t)))
            .count();
        let penalty = (hedges as f64 * HEDGE_PENALTY).min(HEDGE_PENALTY_CAP);

        clamp_dimension(length + structure - penalty).max(CLARITY_FLOOR)
    }
}

fn hits(ans: &str, terms: &[String], threshold: f64) -> Vec<bool> {
    terms.iter().map(|t| keyword_hit(ans, t, threshold)).collect()
}

fn coverage(hits: &[bool], terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    hits.iter().filter(|h| **h).count() as f64 / terms.len() as f64 * DIMENSION_MAX
}

fn picked<'a>(terms: &'a [String], hits: &[bool], want: bool) -> Vec<&'a str> {
    terms
        .iter()
        .zip(hits)
        .filter(|(_, h)| **h == want)
        .map(|(t, _)| t.as_str())
        .take(MAX_FEEDBACK_ITEMS)
        .collect()
}

fn feedback(
    question: &QuestionRecord,
    element_hits: &[bool],
    keyword_hits: &[bool],
    depth_hits: &[bool],
) -> String {
    let (terms, hits) = if question.expected_elements.is_empty() {
        (&question.keywords, keyword_hits)
    } else {
        (&question.expected_elements, element_hits)
    };

    let mut parts = Vec::new();
    let missed = picked(terms, hits, false);
    if terms.is_empty() {
        parts.push("Answer recorded.".to_string());
    } else if missed.is_empty() {
        parts.push("Covered the key points.".to_string());
    } else {
        parts.push(format!("Missed: {}.", missed.join(", ")));
    }

    let depth = picked(&question.advanced_keywords, depth_hits, true);
    if !depth.is_empty() {
        parts.push(format!("Depth: mentioned {}.", depth.join(", ")));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::fixtures;
    use crate::corpus::types::Tier;
    use proptest::prelude::*;

    fn scorer() -> DeterministicScorer {
        DeterministicScorer::from_config(&InterviewConfig::default())
    }

    #[test]
    fn test_pivot_answer_scores_full_completeness() {
        let q = fixtures::pivot_question();
        let r = scorer().score("I would insert a pivot table after selecting the data", &q);
        assert!(r.scores.completeness >= 4.9, "{:?}", r.scores);
        assert_eq!(r.feedback, "Covered the key points.");
    }

    #[test]
    fn test_dont_know_scores_near_zero() {
        let q = fixtures::pivot_question();
        let r = scorer().score("I don't know", &q);
        assert!(r.scores.completeness <= 0.5, "{:?}", r.scores);
        assert_eq!(r.scores.depth, 0.0);
    }

    #[test]
    fn test_empty_and_skip_score_zero() {
        let q = fixtures::pivot_question();
        assert_eq!(scorer().score("   ", &q).scores, DimensionScores::ZERO);
        assert_eq!(scorer().score(SKIP_SENTINEL, &q).scores, DimensionScores::ZERO);
    }

    #[test]
    fn test_accuracy_uses_expected_elements() {
        let q = QuestionRecord {
            expected_elements: vec!["index".into(), "match".into(), "left lookup".into()],
            keywords: vec!["index".into()],
            ..fixtures::question("I-1", Tier::Intermediate, "INDEX/MATCH vs VLOOKUP?")
        };
        let r = scorer().score("Use INDEX with MATCH.", &q);
        assert!((r.scores.accuracy - 3.33).abs() < 0.01, "{:?}", r.scores);
        assert_eq!(r.scores.completeness, 5.0);
        assert_eq!(r.feedback, "Missed: left lookup.");
    }

    #[test]
    fn test_depth_counts_advanced_terms() {
        let q = QuestionRecord {
            advanced_keywords: vec!["xlookup".into(), "power query".into(), "lambda".into()],
            ..fixtures::pivot_question()
        };
        let r = scorer().score("I'd load it with power query and then use xlookup.", &q);
        assert_eq!(r.scores.depth, 2.0);
        assert!(r.feedback.contains("Depth: mentioned xlookup, power query."));

        let none = fixtures::pivot_question();
        assert_eq!(scorer().score("xlookup and lambda", &none).scores.depth, 0.0);
    }

    #[test]
    fn test_clarity_floor_and_hedging() {
        let q = fixtures::pivot_question();
        let short = scorer().score("pivot", &q);
        assert_eq!(short.scores.clarity, CLARITY_FLOOR);

        let clear = "Select the data. Insert a pivot table. Put region in rows. Put sales in values.";
        let hedged = "I think maybe select the data. Probably insert a pivot table. Not sure about rows.";
        assert!(scorer().score(clear, &q).scores.clarity > scorer().score(hedged, &q).scores.clarity);
    }

    #[test]
    fn test_clarity_diminishing_past_cap() {
        let q = fixtures::pivot_question();
        let long = "word ".repeat(60) + ".";
        let longer = "word ".repeat(600) + ".";
        assert_eq!(
            scorer().score(&long, &q).scores.clarity,
            scorer().score(&longer, &q).scores.clarity
        );
    }

    proptest! {
        #[test]
        fn scores_bounded_and_deterministic(answer in ".{0,120}") {
            let q = QuestionRecord {
                expected_elements: vec!["insert pivot table".into()],
                advanced_keywords: vec!["power pivot".into(), "dax".into()],
                ..fixtures::pivot_question()
            };
            let s = scorer();
            let first = s.score(&answer, &q);
            prop_assert!(first.scores.in_range());
            prop_assert_eq!(first, s.score(&answer, &q));
        }
    }
}
