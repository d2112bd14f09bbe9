use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::models::{
    CreditLedgerEntry, Question, QuestionKind, QuestionLevel, Session, SessionAssignment, Template,
};

use super::{
    AssignmentStore, CertificateIssuer, GroupMembershipStore, InsertOutcome, LedgerStore,
    QuestionPoolProvider, SessionStore,
};

/// In-memory backend implementing every store trait behind one shared lock.
/// Used by the test suites and for local tooling without a database.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    questions: Vec<Question>,
    templates: HashMap<String, Template>,
    assignments: HashMap<String, SessionAssignment>,
    group_members: HashMap<String, HashSet<String>>,
    sessions: HashMap<String, Session>,
    ledger: Vec<CreditLedgerEntry>,
    certificate_signals: Vec<CertificateSignal>,
}

#[derive(Debug, Clone)]
pub struct CertificateSignal {
    pub session_id: String,
    pub user_id: String,
    pub score: f64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_question(&self, question: Question) {
        self.inner.lock().unwrap().questions.push(question);
    }

    pub fn seed_template(&self, template: Template) {
        self.inner
            .lock()
            .unwrap()
            .templates
            .insert(template.id.clone(), template);
    }

    pub fn seed_assignment(&self, assignment: SessionAssignment) {
        self.inner
            .lock()
            .unwrap()
            .assignments
            .insert(assignment.id.clone(), assignment);
    }

    pub fn seed_group_member(&self, group_id: &str, user_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .group_members
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(id).cloned()
    }

    pub fn ledger_entries(&self, user_id: &str) -> Vec<CreditLedgerEntry> {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn certificate_signals(&self) -> Vec<CertificateSignal> {
        self.inner.lock().unwrap().certificate_signals.clone()
    }
}

#[async_trait]
impl QuestionPoolProvider for MemoryStore {
    async fn eligible_questions(
        &self,
        topic_ids: &[String],
        levels: &[QuestionLevel],
        kind: QuestionKind,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .questions
            .iter()
            .filter(|q| q.kind == kind)
            .filter(|q| topic_ids.contains(&q.topic_id))
            .filter(|q| levels.contains(&q.level))
            .filter(|q| !exclude_ids.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .questions
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn assignment(&self, id: &str) -> Result<Option<SessionAssignment>> {
        Ok(self.inner.lock().unwrap().assignments.get(id).cloned())
    }

    async fn template(&self, id: &str) -> Result<Option<Template>> {
        Ok(self.inner.lock().unwrap().templates.get(id).cloned())
    }
}

#[async_trait]
impl GroupMembershipStore for MemoryStore {
    async fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .group_members
            .get(group_id)
            .is_some_and(|members| members.contains(user_id)))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_active_exclusive(&self, session: &Session) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(assignment_id) = &session.assignment_id {
            let existing = inner
                .sessions
                .values()
                .find(|s| {
                    s.user_id == session.user_id
                        && s.assignment_id.as_deref() == Some(assignment_id.as_str())
                        && s.status.is_active()
                })
                .cloned();
            if let Some(existing) = existing {
                return Ok(InsertOutcome::ActiveExists(existing));
            }
        }
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.inner.lock().unwrap().sessions.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_active(&self, user_id: &str, assignment_id: &str) -> Result<Option<Session>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.assignment_id.as_deref() == Some(assignment_id)
                    && s.status.is_active()
            })
            .cloned())
    }

    async fn count_completed(&self, user_id: &str, assignment_id: &str) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.assignment_id.as_deref() == Some(assignment_id)
                    && matches!(
                        s.status,
                        crate::models::SessionStatus::Completed
                            | crate::models::SessionStatus::Expired
                    )
            })
            .count() as u64)
    }

    async fn last_completed_at(
        &self,
        user_id: &str,
        assignment_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.assignment_id.as_deref() == Some(assignment_id)
                    && matches!(
                        s.status,
                        crate::models::SessionStatus::Completed
                            | crate::models::SessionStatus::Expired
                    )
            })
            .filter_map(|s| s.finished_at)
            .max())
    }

    async fn recently_answered_question_ids(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.kind == crate::models::SessionKind::Interview
                    && s.started_at >= since
            })
            .flat_map(|s| s.answers.iter().map(|a| a.question_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, entry: &CreditLedgerEntry) -> Result<()> {
        self.inner.lock().unwrap().ledger.push(entry.clone());
        Ok(())
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<CreditLedgerEntry>> {
        Ok(self.ledger_entries(user_id))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CertificateIssuer for MemoryStore {
    async fn signal_eligibility(&self, session_id: &str, user_id: &str, score: f64) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .certificate_signals
            .push(CertificateSignal {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                score,
            });
        Ok(())
    }
}
