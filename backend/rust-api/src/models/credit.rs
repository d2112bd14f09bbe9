use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One immutable credit transaction. Entries are only ever appended;
/// refunds and expirations are new entries, never edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    /// Signed delta: positive for purchase/bonus/refund, negative for
    /// consumption.
    pub credits: i64,
    /// Audit snapshot: available balance immediately after this append.
    pub balance_after: i64,
    pub description: String,
    /// Top-up source or interview session id, depending on kind.
    pub source_ref: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Consumption,
    Refund,
    Bonus,
}

impl CreditLedgerEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GrantCreditsRequest {
    #[validate(range(min = 1))]
    pub credits: i64,
    pub kind: GrantKind,
    #[validate(length(min = 1, max = 256))]
    pub description: String,
    pub source_ref: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Only top-up kinds may be granted through the API; consumption and
/// refunds are written by the engine itself.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    Purchase,
    Bonus,
}

impl From<GrantKind> for TransactionKind {
    fn from(kind: GrantKind) -> Self {
        match kind {
            GrantKind::Purchase => TransactionKind::Purchase,
            GrantKind::Bonus => TransactionKind::Bonus,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreditBalanceResponse {
    pub user_id: String,
    pub available_credits: i64,
}

#[derive(Debug, Serialize)]
pub struct CreditHistoryResponse {
    pub user_id: String,
    pub entries: Vec<CreditLedgerEntry>,
}
