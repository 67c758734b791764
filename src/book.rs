//! Book domain record, create draft, and metadata patch types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BookId, BookStatus};

/// Fully materialized, authoritative book record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    /// Stable book identifier.
    pub id: BookId,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN-10 or ISBN-13 as entered.
    pub isbn: String,
    /// Free-text description.
    pub description: String,
    /// Availability.
    pub status: BookStatus,
    /// Current holder; set iff checked out.
    pub checked_out_by: Option<String>,
    /// Return deadline; set iff checked out.
    pub due_date: Option<DateTime<Utc>>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl BookRecord {
    /// Materializes a new available book from a validated draft.
    pub fn from_draft(id: BookId, draft: BookDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            author: draft.author,
            isbn: draft.isbn,
            description: draft.description,
            status: BookStatus::Available,
            checked_out_by: None,
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when status agrees with the holder and due-date fields.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            BookStatus::Available => self.checked_out_by.is_none() && self.due_date.is_none(),
            BookStatus::CheckedOut => self.checked_out_by.is_some() && self.due_date.is_some(),
        }
    }
}

/// Create payload for a new [`BookRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDraft {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN-10 or ISBN-13.
    pub isbn: String,
    /// Free-text description.
    pub description: String,
}

/// Sparse metadata patch where each `Some` field overwrites the record value.
///
/// Status, holder and due date only change through check-out and check-in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookPatch {
    /// Optional replacement title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional replacement author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Optional replacement ISBN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// Optional replacement description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BookPatch {
    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut BookRecord) {
        if let Some(v) = &self.title {
            rec.title = v.clone();
        }
        if let Some(v) = &self.author {
            rec.author = v.clone();
        }
        if let Some(v) = &self.isbn {
            rec.isbn = v.clone();
        }
        if let Some(v) = &self.description {
            rec.description = v.clone();
        }
    }
}
