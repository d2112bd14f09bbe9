use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::Database;
use redis::aio::ConnectionManager;

use crate::metrics::{
    record_cache_hit, record_cache_miss, track_cache_operation, track_db_operation,
};
use crate::models::{
    CreditLedgerEntry, Question, QuestionKind, QuestionLevel, Session, SessionAssignment,
    SessionKind, Template,
};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

use super::{
    AssignmentStore, CertificateIssuer, GroupMembershipStore, InsertOutcome, LedgerStore,
    QuestionPoolProvider, SessionStore,
};

const SESSION_CACHE_TTL_SECONDS: u64 = 3600;

pub struct MongoQuestionPool {
    mongo: Database,
}

impl MongoQuestionPool {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl QuestionPoolProvider for MongoQuestionPool {
    async fn eligible_questions(
        &self,
        topic_ids: &[String],
        levels: &[QuestionLevel],
        kind: QuestionKind,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>> {
        let collection = self.mongo.collection::<Question>("questions");

        let levels: Vec<String> = levels.iter().map(tag_of).collect::<Result<_>>()?;
        let filter = doc! {
            "kind": tag_of(&kind)?,
            "topic_id": { "$in": topic_ids },
            "level": { "$in": levels },
            "id": { "$nin": exclude_ids },
        };

        let mut cursor = retry_async_with_config(RetryConfig::default(), || async {
            collection.find(filter.clone()).await
        })
        .await
        .context("Failed to query question pool")?;

        let mut questions = Vec::new();
        while cursor.advance().await.context("Failed to advance cursor")? {
            questions.push(
                cursor
                    .deserialize_current()
                    .context("Failed to deserialize question")?,
            );
        }
        Ok(questions)
    }

    async fn questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>> {
        let collection = self.mongo.collection::<Question>("questions");
        let mut cursor = collection
            .find(doc! { "id": { "$in": ids } })
            .await
            .context("Failed to query questions by ids")?;

        let mut questions = Vec::new();
        while cursor.advance().await.context("Failed to advance cursor")? {
            questions.push(
                cursor
                    .deserialize_current()
                    .context("Failed to deserialize question")?,
            );
        }
        Ok(questions)
    }
}

pub struct MongoAssignmentStore {
    mongo: Database,
}

impl MongoAssignmentStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl AssignmentStore for MongoAssignmentStore {
    async fn assignment(&self, id: &str) -> Result<Option<SessionAssignment>> {
        self.mongo
            .collection::<SessionAssignment>("session_assignments")
            .find_one(doc! { "id": id })
            .await
            .context("Failed to query assignment")
    }

    async fn template(&self, id: &str) -> Result<Option<Template>> {
        self.mongo
            .collection::<Template>("templates")
            .find_one(doc! { "id": id })
            .await
            .context("Failed to query template")
    }
}

/// Group membership lives on the user document as a `group_ids` array,
/// owned by the user-administration service.
pub struct MongoGroupStore {
    mongo: Database,
}

impl MongoGroupStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl GroupMembershipStore for MongoGroupStore {
    async fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let count = self
            .mongo
            .collection::<mongodb::bson::Document>("users")
            .count_documents(doc! { "id": user_id, "group_ids": group_id })
            .await
            .context("Failed to query group membership")?;
        Ok(count > 0)
    }
}

/// Durable session storage in MongoDB with a Redis hot cache. Active-session
/// exclusivity is enforced through a guard collection keyed by
/// `{user}:{assignment}`, so concurrent starts race on a unique `_id`
/// instead of a read-then-insert.
pub struct MongoSessionStore {
    mongo: Database,
    redis: ConnectionManager,
}

impl MongoSessionStore {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    fn guard_key(user_id: &str, assignment_id: &str) -> String {
        format!("{}:{}", user_id, assignment_id)
    }

    async fn cache_put(&self, session: &Session) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = format!("session:{}", session.id);
        let json = serde_json::to_string(session).context("Failed to serialize session")?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&key)
                .arg(SESSION_CACHE_TTL_SECONDS)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to cache session in Redis")
        })
        .await
    }

    async fn cache_get(&self, id: &str) -> Result<Option<Session>> {
        let mut conn = self.redis.clone();
        let key = format!("session:{}", id);

        let cached: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .context("Failed to read session cache")
        })
        .await?;

        match cached {
            Some(json) => {
                let session =
                    serde_json::from_str(&json).context("Failed to deserialize cached session")?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn release_guard(&self, user_id: &str, assignment_id: &str) -> Result<()> {
        self.mongo
            .collection::<mongodb::bson::Document>("session_guards")
            .delete_one(doc! { "_id": Self::guard_key(user_id, assignment_id) })
            .await
            .context("Failed to release session guard")?;
        Ok(())
    }

    /// Claims the (user, assignment) guard. Returns the already-active
    /// session when another start holds it.
    async fn claim_guard(&self, session: &Session, assignment_id: &str) -> Result<Option<Session>> {
        let guards = self
            .mongo
            .collection::<mongodb::bson::Document>("session_guards");
        let key = Self::guard_key(&session.user_id, assignment_id);

        let insert = guards
            .insert_one(doc! { "_id": &key, "session_id": &session.id })
            .await;

        match insert {
            Ok(_) => Ok(None),
            Err(e) if is_duplicate_key(&e) => {
                let guard = guards
                    .find_one(doc! { "_id": &key })
                    .await
                    .context("Failed to read session guard")?;
                let holder_id = guard
                    .as_ref()
                    .and_then(|d| d.get_str("session_id").ok())
                    .map(str::to_string);

                if let Some(holder_id) = holder_id {
                    if let Some(holder) = self.find(&holder_id).await? {
                        if holder.status.is_active() {
                            return Ok(Some(holder));
                        }
                    }
                }

                // Stale guard (crashed start or missed cleanup): take it over.
                guards
                    .delete_one(doc! { "_id": &key })
                    .await
                    .context("Failed to clear stale session guard")?;
                guards
                    .insert_one(doc! { "_id": &key, "session_id": &session.id })
                    .await
                    .context("Failed to re-claim session guard")?;
                Ok(None)
            }
            Err(e) => Err(anyhow!(e).context("Failed to claim session guard")),
        }
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn insert_active_exclusive(&self, session: &Session) -> Result<InsertOutcome> {
        if let Some(assignment_id) = session.assignment_id.clone() {
            if let Some(existing) = self.claim_guard(session, &assignment_id).await? {
                return Ok(InsertOutcome::ActiveExists(existing));
            }
        }

        let collection = self.mongo.collection::<Session>("sessions");
        let insert = track_db_operation("insert", "sessions", async {
            collection
                .insert_one(session)
                .await
                .map(|_| ())
                .context("Failed to insert session")
        })
        .await;
        if let Err(e) = insert {
            if let Some(assignment_id) = &session.assignment_id {
                let _ = self.release_guard(&session.user_id, assignment_id).await;
            }
            return Err(e);
        }

        if let Err(e) = self.cache_put(session).await {
            tracing::warn!("Session cache write failed after insert: {:#}", e);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn find(&self, id: &str) -> Result<Option<Session>> {
        match self.cache_get(id).await {
            Ok(Some(session)) => {
                record_cache_hit();
                return Ok(Some(session));
            }
            Ok(None) => record_cache_miss(),
            Err(e) => tracing::warn!("Session cache read failed: {:#}", e),
        }

        let session = retry_async_with_config(RetryConfig::default(), || async {
            self.mongo
                .collection::<Session>("sessions")
                .find_one(doc! { "id": id })
                .await
        })
        .await
        .context("Failed to query session")?;

        if let Some(session) = &session {
            if let Err(e) = self.cache_put(session).await {
                tracing::warn!("Session cache refresh failed: {:#}", e);
            }
        }
        Ok(session)
    }

    async fn update(&self, session: &Session) -> Result<()> {
        let result = self
            .mongo
            .collection::<Session>("sessions")
            .replace_one(doc! { "id": &session.id }, session)
            .await
            .context("Failed to update session")?;
        if result.matched_count == 0 {
            return Err(anyhow!("Session {} vanished during update", session.id));
        }

        // A session leaving the active states frees its start slot.
        if !session.status.is_active() {
            if let Some(assignment_id) = &session.assignment_id {
                self.release_guard(&session.user_id, assignment_id).await?;
            }
        }

        if let Err(e) = self.cache_put(session).await {
            tracing::warn!("Session cache write failed after update: {:#}", e);
        }
        Ok(())
    }

    async fn find_active(&self, user_id: &str, assignment_id: &str) -> Result<Option<Session>> {
        self.mongo
            .collection::<Session>("sessions")
            .find_one(doc! {
                "user_id": user_id,
                "assignment_id": assignment_id,
                "status": { "$in": ["in_progress", "paused"] },
            })
            .await
            .context("Failed to query active session")
    }

    async fn count_completed(&self, user_id: &str, assignment_id: &str) -> Result<u64> {
        self.mongo
            .collection::<Session>("sessions")
            .count_documents(doc! {
                "user_id": user_id,
                "assignment_id": assignment_id,
                "status": { "$in": ["completed", "expired"] },
            })
            .await
            .context("Failed to count completed sessions")
    }

    async fn last_completed_at(
        &self,
        user_id: &str,
        assignment_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut cursor = self
            .mongo
            .collection::<Session>("sessions")
            .find(doc! {
                "user_id": user_id,
                "assignment_id": assignment_id,
                "status": { "$in": ["completed", "expired"] },
            })
            .await
            .context("Failed to query completed sessions")?;

        let mut latest = None;
        while cursor.advance().await.context("Failed to advance cursor")? {
            let session = cursor
                .deserialize_current()
                .context("Failed to deserialize session")?;
            latest = latest.max(session.finished_at);
        }
        Ok(latest)
    }

    async fn recently_answered_question_ids(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let kind = tag_of(&SessionKind::Interview)?;
        let mut cursor = self
            .mongo
            .collection::<Session>("sessions")
            .find(doc! { "user_id": user_id, "kind": kind })
            .await
            .context("Failed to query interview history")?;

        // Timestamps are stored in serde's RFC 3339 form, so the window is
        // applied after deserialization rather than in the query.
        let mut ids = Vec::new();
        while cursor.advance().await.context("Failed to advance cursor")? {
            let session = cursor
                .deserialize_current()
                .context("Failed to deserialize session")?;
            if session.started_at >= since {
                ids.extend(session.answers.iter().map(|a| a.question_id.clone()));
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }
}

pub struct MongoLedgerStore {
    mongo: Database,
}

impl MongoLedgerStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl LedgerStore for MongoLedgerStore {
    async fn append(&self, entry: &CreditLedgerEntry) -> Result<()> {
        // Appends are deliberately not retried: a blind retry after an
        // ambiguous failure could double-book the transaction.
        let collection = self.mongo.collection::<CreditLedgerEntry>("credit_ledger");
        track_db_operation("insert", "credit_ledger", async {
            collection
                .insert_one(entry)
                .await
                .map(|_| ())
                .context("Failed to append ledger entry")
        })
        .await
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<CreditLedgerEntry>> {
        let mut cursor = retry_async_with_config(RetryConfig::default(), || async {
            self.mongo
                .collection::<CreditLedgerEntry>("credit_ledger")
                .find(doc! { "user_id": user_id })
                .await
        })
        .await
        .context("Failed to query ledger entries")?;

        let mut entries = Vec::new();
        while cursor.advance().await.context("Failed to advance cursor")? {
            entries.push(
                cursor
                    .deserialize_current()
                    .context("Failed to deserialize ledger entry")?,
            );
        }
        entries.sort_by_key(|e: &CreditLedgerEntry| e.created_at);
        Ok(entries)
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// Hands certificate-eligibility signals to the external issuer through a
/// queue collection it drains on its own schedule.
pub struct MongoCertificateQueue {
    mongo: Database,
}

impl MongoCertificateQueue {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl CertificateIssuer for MongoCertificateQueue {
    async fn signal_eligibility(&self, session_id: &str, user_id: &str, score: f64) -> Result<()> {
        self.mongo
            .collection::<mongodb::bson::Document>("certificate_signals")
            .insert_one(doc! {
                "session_id": session_id,
                "user_id": user_id,
                "score": score,
                "created_at": Utc::now().to_rfc3339(),
            })
            .await
            .context("Failed to enqueue certificate signal")?;
        Ok(())
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *e.kind
    {
        return we.code == 11000;
    }
    false
}

/// Snake-case wire tag of a unit enum variant, as serde writes it.
fn tag_of<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value).context("Failed to serialize enum tag")? {
        serde_json::Value::String(tag) => Ok(tag),
        other => Err(anyhow!("Expected string tag, got {}", other)),
    }
}
