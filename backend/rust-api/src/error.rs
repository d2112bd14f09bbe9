use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{SessionStatus, Shortfall};

/// Expected engine conditions, returned as typed results and mapped to
/// transport codes by the handlers. Only `Storage` is unexpected.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not eligible: {0}")]
    NotEligible(EligibilityFailure),

    #[error("insufficient credits: {available} available, {required} required")]
    InsufficientCredits { available: i64, required: i64 },

    #[error(
        "insufficient question pool: short {} single, {} multi, {} written",
        .shortfall.single, .shortfall.multi, .shortfall.written
    )]
    InsufficientQuestionPool { shortfall: Shortfall },

    #[error("operation {operation} is illegal in state {from:?}")]
    InvalidStateTransition {
        from: SessionStatus,
        operation: String,
    },

    #[error("answer already recorded for question {question_id}")]
    AnswerAlreadyRecorded { question_id: String },

    #[error("session {session_id} has expired")]
    SessionExpired { session_id: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// First failing visibility check, in evaluation order, for predictable
/// user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityFailure {
    NotInGroup,
    NotAssignee,
    WindowNotOpen,
    WindowClosed,
    AttemptLimitReached,
    CooldownActive { until: DateTime<Utc> },
}

impl std::fmt::Display for EligibilityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInGroup => write!(f, "user is not a member of the assignment group"),
            Self::NotAssignee => write!(f, "assignment is private to another user"),
            Self::WindowNotOpen => write!(f, "assignment window has not opened yet"),
            Self::WindowClosed => write!(f, "assignment window has closed"),
            Self::AttemptLimitReached => write!(f, "attempt limit reached"),
            Self::CooldownActive { until } => {
                write!(f, "cooldown active until {}", until.to_rfc3339())
            }
        }
    }
}
