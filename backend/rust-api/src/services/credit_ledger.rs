use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::metrics::CREDIT_ENTRIES_TOTAL;
use crate::models::{CreditLedgerEntry, TransactionKind};
use crate::storage::LedgerStore;

/// Append-only credit accounting. Balances are always derived from the
/// entries, never stored as mutable state; the only mutable state here is
/// the per-user lock that serializes check-then-append against concurrent
/// consumption.
pub struct CreditLedgerService {
    store: Arc<dyn LedgerStore>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CreditLedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap();
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Sum of non-expired entry deltas, floored at 0 for callers. The raw
    /// sum can only dip below zero transiently inside a serialized debit.
    pub async fn available_credits(&self, user_id: &str) -> Result<i64, EngineError> {
        Ok(self.raw_available(user_id, Utc::now()).await?.max(0))
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<CreditLedgerEntry>, EngineError> {
        Ok(self.store.entries_for_user(user_id).await?)
    }

    /// Appends a non-consumption entry (purchase, bonus, refund). Runs
    /// under the user lock so the balance_after snapshot is consistent.
    pub async fn add_entry(
        &self,
        user_id: &str,
        kind: TransactionKind,
        credits: i64,
        description: &str,
        source_ref: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreditLedgerEntry, EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.append_locked(user_id, kind, credits, description, source_ref, expires_at)
            .await
    }

    /// Debits `credits` for an interview start. The balance check and the
    /// append run under the user lock, so two concurrent consumers can
    /// never both pass the check against a stale balance.
    pub async fn consume(
        &self,
        user_id: &str,
        credits: u32,
        interview_session_id: &str,
        description: &str,
    ) -> Result<CreditLedgerEntry, EngineError> {
        let required = credits as i64;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let available = self.raw_available(user_id, Utc::now()).await?.max(0);
        if available < required {
            tracing::info!(
                "Credit debit refused for user {}: {} available, {} required",
                user_id,
                available,
                required
            );
            return Err(EngineError::InsufficientCredits {
                available,
                required,
            });
        }

        self.append_locked(
            user_id,
            TransactionKind::Consumption,
            -required,
            description,
            Some(interview_session_id.to_string()),
            None,
        )
        .await
    }

    async fn append_locked(
        &self,
        user_id: &str,
        kind: TransactionKind,
        credits: i64,
        description: &str,
        source_ref: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreditLedgerEntry, EngineError> {
        let now = Utc::now();
        let available_before = self.raw_available(user_id, now).await?.max(0);

        let entry = CreditLedgerEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            credits,
            balance_after: available_before + credits,
            description: description.to_string(),
            source_ref,
            expires_at,
            created_at: now,
        };
        self.store.append(&entry).await?;

        CREDIT_ENTRIES_TOTAL
            .with_label_values(&[kind_label(kind)])
            .inc();
        tracing::info!(
            "Ledger entry appended: user={}, kind={}, credits={}, balance_after={}",
            user_id,
            kind_label(kind),
            credits,
            entry.balance_after
        );
        Ok(entry)
    }

    async fn raw_available(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, EngineError> {
        let entries = self.store.entries_for_user(user_id).await?;
        Ok(entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.credits)
            .sum())
    }
}

fn kind_label(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Purchase => "purchase",
        TransactionKind::Consumption => "consumption",
        TransactionKind::Refund => "refund",
        TransactionKind::Bonus => "bonus",
    }
}
