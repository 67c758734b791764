//! Audit-trail entries for check-out and check-in events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BookId, TransactionId, TransactionType};

/// Immutable transaction log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTransaction {
    /// Stable transaction identifier.
    pub id: TransactionId,
    /// Book the event concerns.
    pub book_id: BookId,
    /// Event kind.
    pub transaction_type: TransactionType,
    /// Holder on check-out, previous holder on check-in.
    pub user_id: Option<String>,
    /// Due date recorded on check-out.
    pub due_date: Option<DateTime<Utc>>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Optional free text.
    pub notes: Option<String>,
}

/// Payload for a manually recorded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    /// Book the event concerns; must exist.
    pub book_id: BookId,
    /// Event kind.
    pub transaction_type: TransactionType,
    /// Optional patron id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Optional due date, RFC 3339 or `YYYY-MM-DD`.
    #[serde(default, deserialize_with = "crate::time::deserialize_opt_due_date")]
    pub due_date: Option<DateTime<Utc>>,
    /// Optional free text.
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransactionDraft {
    /// Draft for the entry appended by a check-out.
    pub fn check_out(book_id: BookId, user_id: String, due_date: DateTime<Utc>) -> Self {
        Self {
            book_id,
            transaction_type: TransactionType::CheckOut,
            user_id: Some(user_id),
            due_date: Some(due_date),
            notes: None,
        }
    }

    /// Draft for the entry appended by a check-in.
    pub fn check_in(book_id: BookId, previous_holder: Option<String>) -> Self {
        Self {
            book_id,
            transaction_type: TransactionType::CheckIn,
            user_id: previous_holder,
            due_date: None,
            notes: None,
        }
    }
}
