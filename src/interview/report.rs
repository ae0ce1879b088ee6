use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::eval::aggregate::{Band, BandBreakpoints};
use crate::eval::{round2, DimensionScores};

use super::session::{SessionState, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    InProgress,
    Completed,
    /// The selector ran out of unused questions.
    CorpusExhausted,
    Abandoned,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EndReason::InProgress => "in progress",
            EndReason::Completed => "completed",
            EndReason::CorpusExhausted => "question bank exhausted",
            EndReason::Abandoned => "ended early",
        })
    }
}

/// Transcript plus aggregates handed to report formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub topic: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub configured_questions: usize,
    pub turns: Vec<Turn>,
    /// Mean of the turn scores, 0–100. Skipped turns count as zero.
    pub final_score: f64,
    pub band: Band,
    pub dimension_averages: DimensionScores,
    pub total_elapsed_secs: f64,
}

impl SessionReport {
    pub fn build(
        state: &SessionState,
        topic: &str,
        configured_questions: usize,
        end_reason: EndReason,
        bands: &BandBreakpoints,
    ) -> Self {
        let n = state.turns.len();
        let raw_mean = |f: fn(&Turn) -> f64| -> f64 {
            if n == 0 {
                0.0
            } else {
                state.turns.iter().map(f).sum::<f64>() / n as f64
            }
        };
        let mean = |f: fn(&Turn) -> f64| round2(raw_mean(f));
        let raw_score = raw_mean(|t| t.final_score).clamp(0.0, 100.0);
        let final_score = round2(raw_score);

        Self {
            session_id: state.id,
            topic: topic.to_string(),
            started_at: state.started_at,
            finished_at: Utc::now(),
            end_reason,
            configured_questions,
            turns: state.turns.clone(),
            final_score,
            band: bands.band_for(raw_score),
            dimension_averages: DimensionScores {
                accuracy: mean(|t| t.scores.accuracy),
                completeness: mean(|t| t.scores.completeness),
                clarity: mean(|t| t.scores.clarity),
                depth: mean(|t| t.scores.depth),
            },
            total_elapsed_secs: state.turns.iter().map(|t| t.elapsed_secs).sum(),
        }
    }

    pub fn answered(&self) -> usize {
        self.turns.iter().filter(|t| !t.is_skipped()).count()
    }

    pub fn skipped(&self) -> usize {
        self.turns.len() - self.answered()
    }

    /// Markdown summary for the chat surface.
    pub fn render_summary(&self) -> String {
        let d = &self.dimension_averages;
        let mut out = format!(
            "**{} Mock Interview - Summary**\n\
             **Overall Score:** {:.1} / 100 ({})\n\
             **Questions:** {} answered, {} skipped of {}{}\n\
             **Averages:** Acc {:.2} | Comp {:.2} | Clar {:.2} | Depth {:.2}\n\
             **Time:** {}\n",
            self.topic,
            self.final_score,
            self.band,
            self.answered(),
            self.skipped(),
            self.configured_questions,
            match self.end_reason {
                EndReason::CorpusExhausted => " (question bank exhausted)",
                EndReason::Abandoned => " (ended early)",
                EndReason::InProgress => " (in progress)",
                EndReason::Completed => "",
            },
            d.accuracy,
            d.completeness,
            d.clarity,
            d.depth,
            format_secs(self.total_elapsed_secs),
        );

        for t in &self.turns {
            out.push_str(&format!("\n**Q{}.** {}\n", t.number, t.prompt));
            if t.is_skipped() {
                out.push_str("- Skipped\n");
            } else {
                out.push_str(&format!(
                    "- Score {:.1} ({}): Acc {:.2}, Comp {:.2}, Clar {:.2}, Depth {:.2}\n- {}\n",
                    t.final_score,
                    t.band,
                    t.scores.accuracy,
                    t.scores.completeness,
                    t.scores.clarity,
                    t.scores.depth,
                    t.feedback
                ));
            }
            if let Some(model) = &t.model_answer {
                out.push_str(&format!("- Model answer: {}\n", model));
            }
        }
        out
    }
}

fn format_secs(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    if total >= 60 {
        format!("{}m {:02}s", total / 60, total % 60)
    } else {
        format!("{}s", total)
    }
}
