//! Optional LLM refinement of the dimension scores.
//!
//! Every failure is folded into `SemanticOutcome::Unavailable`; nothing here
//! returns an error to the session.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::corpus::types::QuestionRecord;
use crate::error::InterviewError;
use crate::llm::{ChatBackend, LlmError, Message};
use crate::state::InterviewConfig;

use super::prompts::{hint_request, judge_request, HINT_SYSTEM_PROMPT, JUDGE_SYSTEM_PROMPT};
use super::{round2, DimensionScores, DIMENSION_MAX};

const MAX_BACKOFF: Duration = Duration::from_secs(8);
const BACKOFF_MULTIPLIER: u32 = 2;
const MAX_FEEDBACK_CHARS: usize = 400;
/// A hint is a single attempt; the candidate is waiting on it.
const HINT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_HINT_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticVerdict {
    pub scores: DimensionScores,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemanticOutcome {
    Scored(SemanticVerdict),
    Unavailable(InterviewError),
}

impl SemanticOutcome {
    pub fn disabled() -> Self {
        SemanticOutcome::Unavailable(InterviewError::SemanticScoringUnavailable(
            "disabled by configuration".to_string(),
        ))
    }

    #[cfg(test)]
    pub fn is_scored(&self) -> bool {
        matches!(self, SemanticOutcome::Scored(_))
    }
}

pub struct SemanticScorer {
    backend: Arc<dyn ChatBackend>,
    max_retries: u32,
    attempt_timeout: Duration,
    initial_backoff: Duration,
}

impl SemanticScorer {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &InterviewConfig) -> Self {
        Self {
            backend,
            max_retries: config.semantic_max_retries,
            attempt_timeout: config.semantic_timeout,
            initial_backoff: config.semantic_backoff,
        }
    }

    pub async fn score(
        &self,
        answer: &str,
        question: &QuestionRecord,
        deterministic: &DimensionScores,
    ) -> SemanticOutcome {
        let messages = vec![
            Message::system(JUDGE_SYSTEM_PROMPT),
            Message::user(judge_request(answer, question, deterministic)),
        ];

        let raw = match self.chat_with_retry(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(question = %question.id, error = %e, "semantic judge failed");
                return SemanticOutcome::Unavailable(InterviewError::SemanticScoringUnavailable(
                    e.to_string(),
                ));
            }
        };
        debug!(question = %question.id, response = %raw, "semantic judge response");

        match parse_verdict(&raw) {
            Ok(verdict) => {
                info!(question = %question.id, scores = ?verdict.scores, "semantic scores received");
                SemanticOutcome::Scored(verdict)
            }
            Err(e) => {
                warn!(question = %question.id, error = %e, "discarding semantic response");
                SemanticOutcome::Unavailable(e)
            }
        }
    }

    /// Ask the judge for a nudge on `question`. `None` on any failure.
    pub async fn hint(&self, question: &QuestionRecord) -> Option<String> {
        let messages = vec![
            Message::system(HINT_SYSTEM_PROMPT),
            Message::user(hint_request(question)),
        ];
        let deadline = HINT_TIMEOUT.min(self.attempt_timeout);
        let raw = match tokio::time::timeout(deadline, self.backend.chat(&messages)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(question = %question.id, error = %e, "hint request failed");
                return None;
            }
            Err(_) => {
                warn!(question = %question.id, timeout_ms = deadline.as_millis() as u64, "hint request timed out");
                return None;
            }
        };
        debug!(question = %question.id, response = %raw, "hint response");

        let hint = parse_hint(&raw);
        if hint.is_none() {
            warn!(question = %question.id, "discarding unreadable hint response");
        }
        hint
    }

    /// One attempt plus up to `max_retries` retries, each under its own deadline.
    async fn chat_with_retry(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, self.backend.chat(messages)).await {
                Ok(inner) => inner,
                Err(_) => Err(LlmError::Timeout(self.attempt_timeout)),
            };
            match result {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() || attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying semantic judge after transient error"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Exponential backoff with up to 25% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(attempt))
            .min(MAX_BACKOFF);
        let jitter = rand::thread_rng().gen_range(0.0..0.25);
        base + base.mul_f64(jitter)
    }
}

/// Pull the first `{ ... }` object out of a reply that may carry prose or code fences.
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn dimension(obj: &serde_json::Value, key: &str) -> Result<f64, InterviewError> {
    let value = match &obj[key] {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| InterviewError::MalformedSemanticResponse(format!("missing or non-numeric `{}`", key)))?;

    if !value.is_finite() || !(0.0..=DIMENSION_MAX).contains(&value) {
        return Err(InterviewError::MalformedSemanticResponse(format!(
            "`{}` out of range: {}",
            key, value
        )));
    }
    Ok(round2(value))
}

fn parse_hint(raw: &str) -> Option<String> {
    let obj: serde_json::Value = serde_json::from_str(extract_json(raw)?).ok()?;
    let hint = obj["hint"].as_str()?.trim();
    if hint.is_empty() {
        return None;
    }
    Some(hint.chars().take(MAX_HINT_CHARS).collect())
}

pub fn parse_verdict(raw: &str) -> Result<SemanticVerdict, InterviewError> {
    let json = extract_json(raw)
        .ok_or_else(|| InterviewError::MalformedSemanticResponse("no JSON object in reply".to_string()))?;
    let obj: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| InterviewError::MalformedSemanticResponse(e.to_string()))?;

    let scores = DimensionScores {
        accuracy: dimension(&obj, "accuracy")?,
        completeness: dimension(&obj, "completeness")?,
        clarity: dimension(&obj, "clarity")?,
        depth: dimension(&obj, "depth")?,
    };

    let mut feedback = obj["feedback"].as_str().unwrap_or("").trim().to_string();
    let corrections: Vec<&str> = obj["corrections"]
        .as_array()
        .map(|items| items.iter().filter_map(|c| c.as_str()).map(str::trim).filter(|c| !c.is_empty()).collect())
        .unwrap_or_default();
    if !corrections.is_empty() {
        if !feedback.is_empty() {
            feedback.push(' ');
        }
        feedback.push_str(&format!("Improvements: {}.", corrections.join("; ")));
    }
    if feedback.chars().count() > MAX_FEEDBACK_CHARS {
        feedback = feedback.chars().take(MAX_FEEDBACK_CHARS).collect::<String>() + "...";
    }

    Ok(SemanticVerdict { scores, feedback })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::corpus::fixtures;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) enum Step {
        Reply(Result<String, LlmError>),
        Hang,
    }

    /// Plays back scripted replies; the last step repeats once the script runs out.
    pub(crate) struct ScriptedBackend {
        steps: Mutex<VecDeque<Step>>,
        fallback: Result<String, LlmError>,
        pub calls: AtomicUsize,
    }

    impl ScriptedBackend {
        pub fn new(steps: Vec<Step>, fallback: Result<String, LlmError>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                fallback,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn always(reply: Result<String, LlmError>) -> Self {
            Self::new(vec![], reply)
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(r)) => r,
                Some(Step::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                None => self.fallback.clone(),
            }
        }
    }

    const GOOD: &str = r#"{"accuracy": 4, "completeness": 3.5, "clarity": "4.25", "depth": 1, "feedback": "Good start."}"#;

    fn scorer(backend: Arc<ScriptedBackend>) -> SemanticScorer {
        SemanticScorer::new(backend, &InterviewConfig::default())
    }

    async fn run(backend: Arc<ScriptedBackend>) -> SemanticOutcome {
        scorer(backend)
            .score("answer", &fixtures::pivot_question(), &DimensionScores::ZERO)
            .await
    }

    #[test]
    fn test_parse_verdict_with_prose_and_fences() {
        let raw = format!("Here you go:\n```json\n{}\n```", GOOD);
        let v = parse_verdict(&raw).unwrap();
        assert_eq!(v.scores.clarity, 4.25);
        assert_eq!(v.feedback, "Good start.");
    }

    #[test]
    fn test_parse_verdict_appends_corrections() {
        let raw = r#"{"accuracy":1,"completeness":1,"clarity":1,"depth":0,"corrections":["Use exact match", ""]}"#;
        let v = parse_verdict(raw).unwrap();
        assert_eq!(v.feedback, "Improvements: Use exact match.");
    }

    #[test]
    fn test_parse_verdict_rejects_out_of_range_and_missing() {
        let high = r#"{"accuracy": 7, "completeness": 1, "clarity": 1, "depth": 1}"#;
        assert!(matches!(parse_verdict(high), Err(InterviewError::MalformedSemanticResponse(_))));
        let missing = r#"{"accuracy": 3, "completeness": 1, "clarity": 1}"#;
        assert!(matches!(parse_verdict(missing), Err(InterviewError::MalformedSemanticResponse(_))));
        assert!(parse_verdict("no json here").is_err());
    }

    #[tokio::test]
    async fn test_scored_on_success() {
        let backend = Arc::new(ScriptedBackend::always(Ok(GOOD.to_string())));
        let outcome = run(backend.clone()).await;
        assert!(outcome.is_scored());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![
                Step::Reply(Err(LlmError::Status { code: 503 })),
                Step::Reply(Err(LlmError::Connection("reset".into()))),
            ],
            Ok(GOOD.to_string()),
        ));
        assert!(run(backend.clone()).await.is_scored());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_budget() {
        let backend = Arc::new(ScriptedBackend::always(Err(LlmError::Status { code: 500 })));
        let outcome = run(backend.clone()).await;
        assert!(matches!(
            outcome,
            SemanticOutcome::Unavailable(InterviewError::SemanticScoringUnavailable(_))
        ));
        let max = InterviewConfig::default().semantic_max_retries as usize;
        assert_eq!(backend.calls.load(Ordering::SeqCst), max + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_times_out_and_retries() {
        let backend = Arc::new(ScriptedBackend::new(vec![Step::Hang], Ok(GOOD.to_string())));
        assert!(run(backend.clone()).await.is_scored());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let backend = Arc::new(ScriptedBackend::always(Err(LlmError::Status { code: 401 })));
        assert!(!run(backend.clone()).await.is_scored());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_hint() {
        assert_eq!(
            parse_hint("```json\n{\"hint\": \" Which part of the reference moves? \"}\n```").as_deref(),
            Some("Which part of the reference moves?")
        );
        assert_eq!(parse_hint(r#"{"hint": ""}"#), None);
        assert_eq!(parse_hint("just use a dollar sign"), None);
    }

    #[tokio::test]
    async fn test_hint_from_judge() {
        let backend = Arc::new(ScriptedBackend::always(Ok(r#"{"hint": "Think about summarising by a field."}"#.to_string())));
        let hint = scorer(backend.clone()).hint(&fixtures::pivot_question()).await;
        assert_eq!(hint.as_deref(), Some("Think about summarising by a field."));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_is_single_attempt_under_deadline() {
        let backend = Arc::new(ScriptedBackend::new(vec![Step::Hang], Ok(r#"{"hint": "x"}"#.to_string())));
        assert_eq!(scorer(backend.clone()).hint(&fixtures::pivot_question()).await, None);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let failing = Arc::new(ScriptedBackend::always(Err(LlmError::Status { code: 503 })));
        assert_eq!(scorer(failing.clone()).hint(&fixtures::pivot_question()).await, None);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_unavailable() {
        let backend = Arc::new(ScriptedBackend::always(Ok("I'd give it a 9/10".to_string())));
        assert!(matches!(
            run(backend).await,
            SemanticOutcome::Unavailable(InterviewError::MalformedSemanticResponse(_))
        ));
    }
}
