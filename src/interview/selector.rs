//! Next-question choice under non-repetition and adaptive difficulty.
//!
//! Selection is a pure function of the session history and the corpus; the
//! caller records the chosen id.

use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::corpus::types::{QuestionRecord, Tier};
use crate::corpus::Corpus;
use crate::error::InterviewError;
use crate::eval::similarity::prompt_similarity;
use crate::state::InterviewConfig;

use super::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Uniformly at random among the candidates.
    Random,
    /// Lowest identifier first; reproducible.
    LowestId,
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(SelectionStrategy::Random),
            "lowest_id" | "lowest-id" | "deterministic" => Ok(SelectionStrategy::LowestId),
            other => Err(format!("unknown selection strategy `{}`", other)),
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SelectionStrategy::Random => "random",
            SelectionStrategy::LowestId => "lowest_id",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Selector {
    dedup_threshold: f64,
    strategy: SelectionStrategy,
}

impl Selector {
    pub fn new(dedup_threshold: f64, strategy: SelectionStrategy) -> Self {
        Self {
            dedup_threshold,
            strategy,
        }
    }

    pub fn from_config(config: &InterviewConfig) -> Self {
        Self::new(config.dedup_threshold, config.selection)
    }

    /// Pick the next question, or `CorpusExhausted` when every question is used.
    pub fn next_question<'c, R: Rng + ?Sized>(
        &self,
        state: &SessionState,
        corpus: &'c Corpus,
        rng: &mut R,
    ) -> Result<&'c QuestionRecord, InterviewError> {
        let unused: Vec<&QuestionRecord> = corpus
            .questions()
            .iter()
            .filter(|q| !state.used_ids.contains(&q.id))
            .collect();
        if unused.is_empty() {
            return Err(InterviewError::CorpusExhausted);
        }

        let mut pool: Vec<&QuestionRecord> = unused
            .iter()
            .copied()
            .filter(|q| q.tier.within_one_step(state.tier))
            .collect();
        if pool.is_empty() {
            debug!(tier = %state.tier, remaining = unused.len(), "no questions near tier, widening pool");
            pool = unused;
        }

        let asked: Vec<&str> = state
            .used_ids
            .iter()
            .filter_map(|id| corpus.get(id))
            .map(|q| q.prompt.as_str())
            .collect();
        let distinct: Vec<&QuestionRecord> = pool
            .iter()
            .copied()
            .filter(|q| {
                asked
                    .iter()
                    .all(|p| prompt_similarity(&q.prompt, p) < self.dedup_threshold)
            })
            .collect();
        if distinct.is_empty() {
            warn!(candidates = pool.len(), "every candidate resembles an asked prompt, relaxing dedup");
        } else {
            pool = distinct;
        }

        let picked = match self.strategy {
            SelectionStrategy::LowestId => pool.iter().copied().min_by(|a, b| a.id.cmp(&b.id)),
            SelectionStrategy::Random => pool.choose(rng).copied(),
        };
        picked.ok_or(InterviewError::CorpusExhausted)
    }
}

/// Difficulty adaptation after a scored turn.
pub fn adapt_tier(tier: Tier, final_score: f64, config: &InterviewConfig) -> Tier {
    if final_score >= config.raise_tier_at {
        tier.raised()
    } else if final_score <= config.lower_tier_at {
        tier.lowered()
    } else {
        tier
    }
}
