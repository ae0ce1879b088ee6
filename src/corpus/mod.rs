pub mod types;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use types::{QuestionId, QuestionRecord, RawBank, RawQuestion, Tier};

/// Typographic characters folded to ASCII when the bank is loaded.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2012}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2212}', "-"),
    ('\u{00ad}', "-"),
    ('\u{2026}', "..."),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{00a0}', " "),
    ('\u{2009}', " "),
    ('\u{202f}', " "),
];

/// Replace typographic punctuation with ASCII and collapse whitespace.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match REPLACEMENTS.iter().find(|(c, _)| *c == ch) {
            Some((_, rep)) => out.push_str(rep),
            None => out.push(ch),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content-derived id for records that ship without one.
fn derive_id(prompt: &str) -> QuestionId {
    let hex = blake3::hash(prompt.as_bytes()).to_hex();
    format!("q-{}", &hex.as_str()[..12])
}

fn sanitize_all(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| sanitize(&s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Read-only question bank, ordered by tier then id.
///
/// Shared across sessions behind an `Arc`; nothing mutates it after load.
#[derive(Debug, Clone)]
pub struct Corpus {
    topic: String,
    questions: Vec<QuestionRecord>,
}

impl Corpus {
    /// Build a corpus from already-formed records. Rejects empty banks and duplicate ids.
    pub fn new(topic: impl Into<String>, mut questions: Vec<QuestionRecord>) -> Result<Self> {
        if questions.is_empty() {
            bail!("question bank is empty");
        }
        let mut seen = HashSet::new();
        for q in &questions {
            if !seen.insert(q.id.as_str()) {
                bail!("duplicate question id: {}", q.id);
            }
        }
        questions.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.id.cmp(&b.id)));
        Ok(Self {
            topic: topic.into(),
            questions,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawBank = serde_json::from_str(json).context("Failed to parse question bank")?;
        let shared_depth = sanitize_all(raw.advanced_keywords);
        let records = raw
            .questions
            .into_iter()
            .map(|q| Self::record_from_raw(q, &shared_depth))
            .collect();
        let topic = raw.topic.map(|t| sanitize(&t)).unwrap_or_else(|| "Excel".to_string());
        Self::new(topic, records)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question bank {:?}", path))?;
        let corpus = Self::from_json(&text)?;
        info!(
            path = ?path,
            topic = corpus.topic(),
            questions = corpus.len(),
            basic = corpus.count_in(Tier::Basic),
            intermediate = corpus.count_in(Tier::Intermediate),
            advanced = corpus.count_in(Tier::Advanced),
            "Question bank loaded"
        );
        Ok(corpus)
    }

    fn record_from_raw(raw: RawQuestion, shared_depth: &[String]) -> QuestionRecord {
        let prompt = sanitize(&raw.prompt);
        let id = raw
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| derive_id(&prompt));
        let mut advanced_keywords = sanitize_all(raw.advanced_keywords);
        if advanced_keywords.is_empty() {
            advanced_keywords = shared_depth.to_vec();
        }
        debug!(id = %id, tier = %raw.level, "question record loaded");
        QuestionRecord {
            id,
            tier: raw.level,
            prompt,
            keywords: sanitize_all(raw.keywords),
            expected_elements: sanitize_all(raw.expected_elements),
            advanced_keywords,
            model_answer: raw.model_answer.map(|s| sanitize(&s)).filter(|s| !s.is_empty()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn questions(&self) -> &[QuestionRecord] {
        &self.questions
    }

    pub fn get(&self, id: &str) -> Option<&QuestionRecord> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn in_tier(&self, tier: Tier) -> impl Iterator<Item = &QuestionRecord> {
        self.questions.iter().filter(move |q| q.tier == tier)
    }

    pub fn count_in(&self, tier: Tier) -> usize {
        self.in_tier(tier).count()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::types::{QuestionRecord, Tier};

    pub fn question(id: &str, tier: Tier, prompt: &str) -> QuestionRecord {
        QuestionRecord {
            id: id.to_string(),
            tier,
            prompt: prompt.to_string(),
            keywords: vec![],
            expected_elements: vec![],
            advanced_keywords: vec![],
            model_answer: None,
        }
    }

    pub fn pivot_question() -> QuestionRecord {
        QuestionRecord {
            keywords: vec!["pivot".into(), "table".into(), "insert".into()],
            ..question("pivot-1", Tier::Basic, "How would you summarise sales by region?")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "topic": "Excel",
        "advanced_keywords": ["xlookup", "power query"],
        "questions": [
            {"id": "B2", "level": "basic", "prompt": "What does the $ symbol do\u2014briefly?",
             "concepts_required": ["absolute reference"], "acceptable_terms": ["lock", "anchor"]},
            {"level": "scenario", "prompt": "Clean a messy CSV.",
             "expected_elements": ["power query"], "advanced_keywords": ["m code"]},
            {"id": "B1", "level": "basic", "prompt": "Freeze the top row."}
        ]
    }"#;

    #[test]
    fn test_sanitize_folds_typography() {
        assert_eq!(sanitize("a\u{2014}b \u{201c}c\u{201d}\u{2026}"), "a-b \"c\"...");
        assert_eq!(sanitize("  spaced \t\n out  "), "spaced out");
    }

    #[test]
    fn test_load_accepts_field_aliases() {
        let corpus = Corpus::from_json(BANK).unwrap();
        let q = corpus.get("B2").unwrap();
        assert_eq!(q.prompt, "What does the $ symbol do-briefly?");
        assert_eq!(q.expected_elements, vec!["absolute reference"]);
        assert_eq!(q.keywords, vec!["lock", "anchor"]);
        assert_eq!(q.advanced_keywords, vec!["xlookup", "power query"]);
    }

    #[test]
    fn test_scenario_maps_to_advanced_and_gets_derived_id() {
        let corpus = Corpus::from_json(BANK).unwrap();
        let q = corpus.in_tier(Tier::Advanced).next().unwrap();
        assert!(q.id.starts_with("q-"));
        assert_eq!(q.id.len(), 14);
        assert_eq!(q.advanced_keywords, vec!["m code"]);
        // Derived ids are stable across loads.
        let again = Corpus::from_json(BANK).unwrap();
        assert_eq!(again.in_tier(Tier::Advanced).next().unwrap().id, q.id);
    }

    #[test]
    fn test_questions_sorted_by_tier_then_id() {
        let corpus = Corpus::from_json(BANK).unwrap();
        let ids: Vec<_> = corpus.questions().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(&ids[..2], &["B1", "B2"]);
        assert_eq!(corpus.count_in(Tier::Basic), 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dup = r#"{"questions": [
            {"id": "X", "level": "basic", "prompt": "a"},
            {"id": "X", "level": "advanced", "prompt": "b"}
        ]}"#;
        assert!(Corpus::from_json(dup).is_err());
    }

    #[test]
    fn test_empty_bank_rejected() {
        assert!(Corpus::from_json(r#"{"questions": []}"#).is_err());
    }

    #[test]
    fn test_shipped_bank_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/question_bank.json");
        let corpus = Corpus::load(&path).unwrap();
        for tier in Tier::ALL {
            assert!(corpus.count_in(tier) > 0, "no {} questions", tier);
        }
    }
}
