use thiserror::Error;

/// Errors raised by the interview core.
///
/// Only `InvalidConfiguration` is meant to reach an operator. The semantic
/// variants are carried inside `SemanticOutcome::Unavailable` and never abort a
/// session; `CorpusExhausted` ends a session early.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InterviewError {
    #[error("no unused question satisfies the selection constraints")]
    CorpusExhausted,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("semantic scoring unavailable: {0}")]
    SemanticScoringUnavailable(String),

    #[error("malformed semantic response: {0}")]
    MalformedSemanticResponse(String),

    #[error("no question is awaiting an answer")]
    NoActiveQuestion,

    #[error("the interview has already started")]
    AlreadyStarted,

    #[error("the interview has already finished")]
    SessionFinished,
}

impl InterviewError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
