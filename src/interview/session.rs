//! Interview session state machine.
//!
//! `Init → Introduction → AwaitingQuestionSelection → Presenting → AwaitingAnswer
//! → Evaluating → Feedback → (AwaitingQuestionSelection | Summary) → Done`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::corpus::types::{QuestionId, QuestionRecord, Tier};
use crate::corpus::Corpus;
use crate::error::InterviewError;
use crate::eval::aggregate::Band;
use crate::eval::deterministic::SKIP_SENTINEL;
use crate::eval::{DimensionScores, Evaluator, ScoringMode};
use crate::state::InterviewConfig;

use super::report::{EndReason, SessionReport};
use super::selector::{adapt_tier, Selector};

const HINT_TERMS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Introduction,
    AwaitingQuestionSelection,
    Presenting,
    AwaitingAnswer,
    Evaluating,
    Feedback,
    Summary,
    Done,
}

/// What the candidate sent while a question is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Answer(String),
    Skip,
    Hint,
}

impl Input {
    /// `hint` and `skip` are recognised case-insensitively after trimming;
    /// anything else is an answer.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hint" => Input::Hint,
            "skip" => Input::Skip,
            _ => Input::Answer(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Answer {
    Text(String),
    Skipped,
}

impl Answer {
    pub fn as_text(&self) -> &str {
        match self {
            Answer::Text(t) => t,
            Answer::Skipped => SKIP_SENTINEL,
        }
    }
}

/// One recorded question–answer–evaluation cycle. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub number: usize,
    pub question_id: QuestionId,
    pub prompt: String,
    pub tier: Tier,
    pub answer: Answer,
    pub elapsed_secs: f64,
    pub scores: DimensionScores,
    pub final_score: f64,
    pub band: Band,
    /// `None` for skipped questions.
    pub mode: Option<ScoringMode>,
    pub feedback: String,
    pub hints_used: u32,
    pub model_answer: Option<String>,
}

impl Turn {
    pub fn is_skipped(&self) -> bool {
        self.answer == Answer::Skipped
    }
}

/// History and difficulty of one interview.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
    pub used_ids: HashSet<QuestionId>,
    pub tier: Tier,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            turns: Vec::new(),
            used_ids: HashSet::new(),
            tier: Tier::Basic,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages the session emits for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Introduction(String),
    Question {
        number: usize,
        total: usize,
        tier: Tier,
        prompt: String,
    },
    Hint(String),
    Feedback(Turn),
    Skipped(Turn),
    Summary(SessionReport),
}

struct OpenQuestion {
    question: QuestionRecord,
    presented_at: Instant,
    hints: u32,
}

pub struct InterviewSession {
    config: Arc<InterviewConfig>,
    corpus: Arc<Corpus>,
    evaluator: Evaluator,
    selector: Selector,
    rng: StdRng,
    phase: Phase,
    state: SessionState,
    open: Option<OpenQuestion>,
    end_reason: Option<EndReason>,
}

impl InterviewSession {
    /// Fails fast on invalid configuration.
    pub fn new(
        config: Arc<InterviewConfig>,
        corpus: Arc<Corpus>,
        evaluator: Evaluator,
    ) -> Result<Self, InterviewError> {
        config.validate()?;
        Ok(Self {
            selector: Selector::from_config(&config),
            config,
            corpus,
            evaluator,
            rng: StdRng::from_entropy(),
            phase: Phase::Init,
            state: SessionState::new(),
            open: None,
            end_reason: None,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn current_question(&self) -> Option<&QuestionRecord> {
        self.open.as_ref().map(|o| &o.question)
    }

    /// Introduce the interview and present the first question.
    pub fn start(&mut self) -> Result<Vec<Event>, InterviewError> {
        if self.phase != Phase::Init {
            return Err(InterviewError::AlreadyStarted);
        }
        self.phase = Phase::Introduction;
        info!(
            session = %self.state.id,
            questions = self.config.question_count,
            semantic = self.evaluator.semantic_enabled(),
            "Interview started"
        );
        let mut events = vec![Event::Introduction(format!(
            "Hi! I'll run your {} mock interview: {} questions, one at a time. \
             Type `hint` for a nudge or `skip` to move on.",
            self.corpus.topic(),
            self.config.question_count
        ))];
        self.advance(&mut events);
        Ok(events)
    }

    /// Feed one line of candidate input to the open question.
    pub async fn handle(&mut self, raw: &str) -> Result<Vec<Event>, InterviewError> {
        match self.phase {
            Phase::Done | Phase::Summary => return Err(InterviewError::SessionFinished),
            Phase::AwaitingAnswer => {}
            // An evaluation future was dropped before it finished.
            Phase::Evaluating if self.open.is_some() => {
                warn!(session = %self.state.id, "previous evaluation was interrupted, question reopened");
                self.phase = Phase::AwaitingAnswer;
            }
            _ => return Err(InterviewError::NoActiveQuestion),
        }

        match Input::parse(raw) {
            Input::Hint => Ok(vec![Event::Hint(self.hint().await?)]),
            Input::Skip => self.skip(),
            Input::Answer(text) => self.answer(text).await,
        }
    }

    /// Hint for the open question; does not consume a turn. Asks the judge
    /// when semantic scoring is on, otherwise names the first expected elements.
    async fn hint(&mut self) -> Result<String, InterviewError> {
        let open = self.open.as_mut().ok_or(InterviewError::NoActiveQuestion)?;
        open.hints += 1;
        let hints = open.hints;
        let question = open.question.clone();
        debug!(session = %self.state.id, question = %question.id, hints, "hint requested");

        if let Some(text) = self.evaluator.hint(&question).await {
            return Ok(text);
        }
        Ok(fallback_hint(&question, self.corpus.topic()))
    }

    fn skip(&mut self) -> Result<Vec<Event>, InterviewError> {
        let open = self.open.take().ok_or(InterviewError::NoActiveQuestion)?;
        let turn = Turn {
            number: self.state.turns.len() + 1,
            question_id: open.question.id.clone(),
            prompt: open.question.prompt.clone(),
            tier: open.question.tier,
            answer: Answer::Skipped,
            elapsed_secs: open.presented_at.elapsed().as_secs_f64(),
            scores: DimensionScores::ZERO,
            final_score: 0.0,
            band: self.config.bands.band_for(0.0),
            mode: None,
            feedback: "Skipped.".to_string(),
            hints_used: open.hints,
            model_answer: open.question.model_answer.clone(),
        };
        info!(session = %self.state.id, turn = turn.number, question = %turn.question_id, "Question skipped");
        self.state.turns.push(turn.clone());

        // Skips leave the difficulty tier untouched.
        let mut events = vec![Event::Skipped(turn)];
        self.phase = Phase::AwaitingQuestionSelection;
        self.advance(&mut events);
        Ok(events)
    }

    async fn answer(&mut self, text: String) -> Result<Vec<Event>, InterviewError> {
        let Some(open) = self.open.as_ref() else {
            return Err(InterviewError::NoActiveQuestion);
        };
        let question = open.question.clone();
        let elapsed_secs = open.presented_at.elapsed().as_secs_f64();
        self.phase = Phase::Evaluating;

        // The question stays open until the evaluation returns.
        let evaluation = match self.evaluator.evaluate(&text, &question).await {
            Ok(e) => e,
            Err(e) => {
                self.phase = Phase::AwaitingAnswer;
                return Err(e);
            }
        };
        let Some(open) = self.open.take() else {
            return Err(InterviewError::NoActiveQuestion);
        };

        let turn = Turn {
            number: self.state.turns.len() + 1,
            question_id: open.question.id.clone(),
            prompt: open.question.prompt.clone(),
            tier: open.question.tier,
            answer: Answer::Text(text),
            elapsed_secs,
            scores: evaluation.scores,
            final_score: evaluation.final_score,
            band: evaluation.band,
            mode: Some(evaluation.mode),
            feedback: evaluation.feedback,
            hints_used: open.hints,
            model_answer: open.question.model_answer.clone(),
        };
        self.state.turns.push(turn.clone());
        self.phase = Phase::Feedback;

        let previous = self.state.tier;
        self.state.tier = adapt_tier(previous, turn.final_score, &self.config);
        info!(
            session = %self.state.id,
            turn = turn.number,
            question = %turn.question_id,
            score = turn.final_score,
            band = %turn.band,
            mode = %evaluation.mode,
            tier_from = %previous,
            tier_to = %self.state.tier,
            "Answer evaluated"
        );

        let mut events = vec![Event::Feedback(turn)];
        self.phase = Phase::AwaitingQuestionSelection;
        self.advance(&mut events);
        Ok(events)
    }

    /// Select and present the next question, or move to the summary.
    fn advance(&mut self, events: &mut Vec<Event>) {
        self.phase = Phase::AwaitingQuestionSelection;
        if self.state.turns.len() >= self.config.question_count {
            self.end_reason = Some(EndReason::Completed);
            events.push(self.summarize());
            return;
        }

        let picked = self
            .selector
            .next_question(&self.state, &self.corpus, &mut self.rng)
            .cloned();
        match picked {
            Ok(question) => {
                self.phase = Phase::Presenting;
                self.state.used_ids.insert(question.id.clone());
                debug!(session = %self.state.id, question = %question.id, tier = %question.tier, "question selected");
                events.push(Event::Question {
                    number: self.state.turns.len() + 1,
                    total: self.config.question_count,
                    tier: question.tier,
                    prompt: question.prompt.clone(),
                });
                self.open = Some(OpenQuestion {
                    question,
                    presented_at: Instant::now(),
                    hints: 0,
                });
                self.phase = Phase::AwaitingAnswer;
            }
            Err(e) => {
                warn!(session = %self.state.id, turns = self.state.turns.len(), error = %e, "Ending interview early");
                self.end_reason = Some(EndReason::CorpusExhausted);
                events.push(self.summarize());
            }
        }
    }

    /// Abandon the interview early. Returns `None` if it already finished.
    pub fn finish(&mut self) -> Option<SessionReport> {
        if self.is_done() {
            return None;
        }
        self.open = None;
        self.end_reason = Some(EndReason::Abandoned);
        match self.summarize() {
            Event::Summary(report) => Some(report),
            _ => None,
        }
    }

    fn summarize(&mut self) -> Event {
        self.phase = Phase::Summary;
        let report = self.report();
        info!(
            session = %self.state.id,
            turns = report.turns.len(),
            score = report.final_score,
            band = %report.band,
            reason = ?report.end_reason,
            "Interview finished"
        );
        self.phase = Phase::Done;
        Event::Summary(report)
    }

    /// Snapshot of the transcript and aggregates so far.
    pub fn report(&self) -> SessionReport {
        SessionReport::build(
            &self.state,
            self.corpus.topic(),
            self.config.question_count,
            self.end_reason.unwrap_or(EndReason::InProgress),
            &self.config.bands,
        )
    }
}

fn fallback_hint(question: &QuestionRecord, topic: &str) -> String {
    let terms = if question.expected_elements.is_empty() {
        &question.keywords
    } else {
        &question.expected_elements
    };
    if terms.is_empty() {
        format!("Think about the key {} features involved.", topic)
    } else {
        let picked: Vec<&str> = terms.iter().take(HINT_TERMS).map(String::as_str).collect();
        format!("Consider: {}", picked.join(", "))
    }
}
