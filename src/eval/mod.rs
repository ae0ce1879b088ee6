pub mod aggregate;
pub mod deterministic;
pub mod prompts;
pub mod semantic;
pub mod similarity;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::corpus::types::QuestionRecord;
use crate::error::InterviewError;
use crate::state::InterviewConfig;

use aggregate::{aggregate, Band};
use deterministic::DeterministicScorer;
use semantic::{SemanticOutcome, SemanticScorer};

/// Upper bound of every dimension score.
pub const DIMENSION_MAX: f64 = 5.0;

/// The four bounded sub-scores of one answer, each in `[0, DIMENSION_MAX]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub accuracy: f64,
    pub completeness: f64,
    pub clarity: f64,
    pub depth: f64,
}

impl DimensionScores {
    pub const ZERO: DimensionScores = DimensionScores {
        accuracy: 0.0,
        completeness: 0.0,
        clarity: 0.0,
        depth: 0.0,
    };

    pub fn as_array(&self) -> [f64; 4] {
        [self.accuracy, self.completeness, self.clarity, self.depth]
    }

    pub fn from_array([accuracy, completeness, clarity, depth]: [f64; 4]) -> Self {
        Self {
            accuracy,
            completeness,
            clarity,
            depth,
        }
    }

    /// Apply `f` to each dimension pairwise with `other`.
    pub fn zip_with(&self, other: &DimensionScores, f: impl Fn(f64, f64) -> f64) -> Self {
        let a = self.as_array();
        let b = other.as_array();
        Self::from_array([f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2]), f(a[3], b[3])])
    }

    pub fn clamped(&self) -> Self {
        self.zip_with(self, |v, _| clamp_dimension(v))
    }

    pub fn in_range(&self) -> bool {
        self.as_array()
            .iter()
            .all(|v| v.is_finite() && (0.0..=DIMENSION_MAX).contains(v))
    }
}

/// Clamp to the dimension range, mapping NaN to zero.
pub fn clamp_dimension(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, DIMENSION_MAX)
    }
}

/// Round to two decimals, as scores are reported.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Dimension weights. Must be non-negative and sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub accuracy: f64,
    pub completeness: f64,
    pub clarity: f64,
    pub depth: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.38,
            completeness: 0.30,
            clarity: 0.18,
            depth: 0.14,
        }
    }
}

impl ScoringWeights {
    const TOLERANCE: f64 = 1e-6;

    pub fn as_array(&self) -> [f64; 4] {
        [self.accuracy, self.completeness, self.clarity, self.depth]
    }

    pub fn validate(&self) -> Result<(), InterviewError> {
        let w = self.as_array();
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(InterviewError::config(format!(
                "dimension weights must be non-negative, got {:?}",
                w
            )));
        }
        let sum: f64 = w.iter().sum();
        if (sum - 1.0).abs() > Self::TOLERANCE {
            return Err(InterviewError::config(format!(
                "dimension weights must sum to 1.0, got {:.4}",
                sum
            )));
        }
        Ok(())
    }
}

/// How a turn's final scores were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Deterministic,
    Hybrid,
    /// Semantic scoring was enabled but unavailable for this answer.
    DeterministicFallback,
}

impl std::fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScoringMode::Deterministic => "deterministic",
            ScoringMode::Hybrid => "hybrid",
            ScoringMode::DeterministicFallback => "deterministic (semantic fallback)",
        })
    }
}

/// Result of evaluating one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub deterministic: DimensionScores,
    /// Blended per-dimension scores that fed the final score.
    pub scores: DimensionScores,
    pub final_score: f64,
    pub band: Band,
    pub mode: ScoringMode,
    pub feedback: String,
}

/// Runs the deterministic scorer, the optional semantic scorer and the aggregator.
pub struct Evaluator {
    config: Arc<InterviewConfig>,
    deterministic: DeterministicScorer,
    semantic: Option<Arc<SemanticScorer>>,
}

impl Evaluator {
    pub fn new(config: Arc<InterviewConfig>, semantic: Option<Arc<SemanticScorer>>) -> Self {
        let deterministic = DeterministicScorer::from_config(&config);
        Self {
            config,
            deterministic,
            semantic,
        }
    }

    pub fn semantic_enabled(&self) -> bool {
        self.config.semantic_enabled && self.semantic.is_some()
    }

    /// Judge-written hint, when semantic scoring is on and the judge answers.
    pub async fn hint(&self, question: &QuestionRecord) -> Option<String> {
        match &self.semantic {
            Some(scorer) if self.config.semantic_enabled => scorer.hint(question).await,
            _ => None,
        }
    }

    pub async fn evaluate(
        &self,
        answer: &str,
        question: &QuestionRecord,
    ) -> Result<Evaluation, InterviewError> {
        let det = self.deterministic.score(answer, question);
        debug!(question = %question.id, scores = ?det.scores, "deterministic scores");

        // Blank answers score zero without asking the judge.
        let answered = !answer.trim().is_empty();
        let outcome = match (&self.semantic, self.config.semantic_enabled) {
            (Some(scorer), true) if answered => {
                scorer.score(answer, question, &det.scores).await
            }
            _ => SemanticOutcome::disabled(),
        };

        let (semantic_scores, semantic_feedback, mode) = match &outcome {
            SemanticOutcome::Scored(verdict) => {
                (Some(verdict.scores), Some(verdict.feedback.clone()), ScoringMode::Hybrid)
            }
            SemanticOutcome::Unavailable(reason) if self.semantic_enabled() && answered => {
                info!(question = %question.id, %reason, "semantic scoring unavailable, using deterministic scores");
                (None, None, ScoringMode::DeterministicFallback)
            }
            SemanticOutcome::Unavailable(_) => (None, None, ScoringMode::Deterministic),
        };

        let result = aggregate(
            &det.scores,
            semantic_scores.as_ref(),
            &self.config.weights,
            self.config.blend_max_delta,
            &self.config.bands,
        )?;

        let mut feedback = det.feedback;
        if let Some(extra) = semantic_feedback.filter(|f| !f.is_empty()) {
            feedback.push(' ');
            feedback.push_str(&extra);
        }

        Ok(Evaluation {
            deterministic: det.scores,
            scores: result.blended,
            final_score: result.final_score,
            band: result.band,
            mode,
            feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::fixtures;
    use crate::eval::semantic::tests::ScriptedBackend;
    use crate::llm::LlmError;

    fn config(semantic: bool) -> Arc<InterviewConfig> {
        Arc::new(InterviewConfig {
            semantic_enabled: semantic,
            ..InterviewConfig::default()
        })
    }

    #[test]
    fn test_default_weights_valid() {
        assert!(ScoringWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let w = ScoringWeights {
            accuracy: 0.5,
            ..ScoringWeights::default()
        };
        assert!(matches!(w.validate(), Err(InterviewError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let w = ScoringWeights {
            accuracy: -0.1,
            completeness: 0.78,
            clarity: 0.18,
            depth: 0.14,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_clamp_dimension_handles_nan() {
        assert_eq!(clamp_dimension(f64::NAN), 0.0);
        assert_eq!(clamp_dimension(7.0), DIMENSION_MAX);
        assert_eq!(clamp_dimension(-1.0), 0.0);
    }

    #[tokio::test]
    async fn test_deterministic_only_mode() {
        let evaluator = Evaluator::new(config(false), None);
        let q = fixtures::pivot_question();
        let eval = evaluator
            .evaluate("I would insert a pivot table after selecting the data", &q)
            .await
            .unwrap();
        assert_eq!(eval.mode, ScoringMode::Deterministic);
        assert_eq!(eval.scores, eval.deterministic);
        assert!((0.0..=100.0).contains(&eval.final_score));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_judge_equals_deterministic_aggregate() {
        let cfg = config(true);
        let backend = ScriptedBackend::always(Err(LlmError::Connection("refused".into())));
        let scorer = Arc::new(SemanticScorer::new(Arc::new(backend), &cfg));
        let hybrid = Evaluator::new(cfg, Some(scorer));
        let plain = Evaluator::new(config(false), None);
        let q = fixtures::pivot_question();
        let answer = "Insert a pivot table. Then drag region to rows.";

        let degraded = hybrid.evaluate(answer, &q).await.unwrap();
        let baseline = plain.evaluate(answer, &q).await.unwrap();
        assert_eq!(degraded.mode, ScoringMode::DeterministicFallback);
        assert_eq!(degraded.final_score, baseline.final_score);
        assert_eq!(degraded.scores, baseline.scores);
    }

    #[tokio::test]
    async fn test_hybrid_mode_appends_feedback() {
        let cfg = config(true);
        let reply = r#"{"accuracy": 5, "completeness": 5, "clarity": 5, "depth": 5, "feedback": "Solid."}"#;
        let backend = ScriptedBackend::always(Ok(reply.to_string()));
        let scorer = Arc::new(SemanticScorer::new(Arc::new(backend), &cfg));
        let evaluator = Evaluator::new(cfg, Some(scorer));
        let eval = evaluator
            .evaluate("I would insert a pivot table", &fixtures::pivot_question())
            .await
            .unwrap();
        assert_eq!(eval.mode, ScoringMode::Hybrid);
        assert!(eval.feedback.ends_with("Solid."));
        for (blended, det) in eval.scores.as_array().iter().zip(eval.deterministic.as_array()) {
            assert!(*blended >= det);
        }
    }
}
