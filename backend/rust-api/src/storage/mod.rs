use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    CreditLedgerEntry, Question, QuestionKind, QuestionLevel, Session, SessionAssignment, Template,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;

/// Question-bank collaborator. Eligibility (usable-in-session, excluded
/// ids) is the provider's concern, not the selector's.
#[async_trait]
pub trait QuestionPoolProvider: Send + Sync {
    async fn eligible_questions(
        &self,
        topic_ids: &[String],
        levels: &[QuestionLevel],
        kind: QuestionKind,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>>;

    async fn questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>>;
}

/// Read-only access to templates and their assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn assignment(&self, id: &str) -> Result<Option<SessionAssignment>>;

    async fn template(&self, id: &str) -> Result<Option<Template>>;
}

#[async_trait]
pub trait GroupMembershipStore: Send + Sync {
    async fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool>;
}

/// Outcome of the race-free active-session insert.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted,
    /// Another InProgress/Paused session already exists for the same
    /// (user, assignment); the existing session is returned.
    ActiveExists(Session),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session, guaranteeing at most one active session per
    /// (user, assignment). Ad-hoc sessions (no assignment) are exempt.
    async fn insert_active_exclusive(&self, session: &Session) -> Result<InsertOutcome>;

    async fn find(&self, id: &str) -> Result<Option<Session>>;

    async fn update(&self, session: &Session) -> Result<()>;

    async fn find_active(
        &self,
        user_id: &str,
        assignment_id: &str,
    ) -> Result<Option<Session>>;

    /// Completed-attempt count for attempt limits (Completed + Expired;
    /// abandoned runs do not count).
    async fn count_completed(&self, user_id: &str, assignment_id: &str) -> Result<u64>;

    async fn last_completed_at(
        &self,
        user_id: &str,
        assignment_id: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Question ids the user answered in interview sessions started at or
    /// after `since`. Feeds the selector's reuse-cooldown exclusion.
    async fn recently_answered_question_ids(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: &CreditLedgerEntry) -> Result<()>;

    /// All entries for the user, oldest first.
    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<CreditLedgerEntry>>;

    async fn ping(&self) -> Result<()>;
}

/// One-way certificate-eligibility signal. The engine never waits on the
/// issuer's result.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn signal_eligibility(&self, session_id: &str, user_id: &str, score: f64) -> Result<()>;
}
