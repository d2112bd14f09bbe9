use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod answer;
pub mod assignment;
pub mod credit;
pub mod question;
pub mod template;

pub use answer::{Answer, SubmitAnswerRequest, SubmitAnswerResponse};
pub use assignment::{SessionAssignment, Visibility};
pub use credit::{CreditLedgerEntry, TransactionKind};
pub use question::{Question, QuestionKind, QuestionLevel, QuestionView};
pub use template::{
    NavigationMode, ResubmissionPolicy, SelectionCriteria, SessionKind, Shortfall, Template,
};

/// One user's run through a generated question set. Owned exclusively by its
/// user and mutated only through the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// None for ad-hoc practice started directly from a template.
    pub assignment_id: Option<String>,
    pub template_id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    /// Start of the current running time segment; None while paused or
    /// terminal.
    pub active_since: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub current_question_index: usize,
    /// Ordered question sequence, fixed at creation.
    pub question_ids: Vec<String>,
    /// Aggregate time budget snapshot taken from the template at creation.
    pub time_budget_sec: Option<u32>,
    /// Effective certification flag snapshot (template flag with the
    /// assignment's override applied). Interviews only.
    pub certification_enabled: bool,
    pub total_score: f64,
    /// Accumulated seconds from closed segments (updated on pause, finish
    /// and expiry).
    pub total_time_sec: u32,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Paused,
    Completed,
    Expired,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Expired | SessionStatus::Abandoned
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::InProgress | SessionStatus::Paused)
    }
}

impl Session {
    pub fn answer_for(&self, question_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// First question index without a recorded answer, or the sequence
    /// length when everything is answered.
    pub fn first_unanswered_index(&self) -> usize {
        self.question_ids
            .iter()
            .position(|q| self.answer_for(q).is_none())
            .unwrap_or(self.question_ids.len())
    }

    /// Seconds elapsed across closed segments plus the running segment.
    pub fn elapsed_sec(&self, now: DateTime<Utc>) -> u32 {
        let running = self
            .active_since
            .map(|since| (now - since).num_seconds().max(0) as u32)
            .unwrap_or(0);
        self.total_time_sec + running
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    /// Start through an assignment (visibility rules apply) ...
    pub assignment_id: Option<String>,
    /// ... or ad-hoc practice straight from a template.
    pub template_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub questions: Vec<QuestionView>,
    /// Per-bucket shortage when the pool could not fill the criteria.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<Shortfall>,
}
