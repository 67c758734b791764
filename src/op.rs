//! Mutation operation model and persistence wrappers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    book::{BookPatch, BookRecord},
    transaction::BookTransaction,
    types::{BookId, OpSeq},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable operation appended to the journal.
///
/// Lifecycle ops carry the transaction they produced; the book fields they
/// change are derived from it on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Insert a fully materialized book.
    CreateBook {
        /// Inserted record.
        book: BookRecord,
    },
    /// Overwrite metadata fields.
    UpdateBook {
        /// Book to mutate.
        id: BookId,
        /// Fields to overwrite.
        patch: BookPatch,
        /// New `updated_at` value.
        updated_at: DateTime<Utc>,
    },
    /// Remove a book record.
    DeleteBook {
        /// Removed book.
        id: BookId,
    },
    /// Available -> checked out, plus its CHECK_OUT entry.
    CheckOut {
        /// Appended transaction.
        txn: BookTransaction,
    },
    /// Checked out -> available, plus its CHECK_IN entry.
    CheckIn {
        /// Appended transaction.
        txn: BookTransaction,
    },
    /// Manually recorded transaction; book state is untouched.
    RecordTransaction {
        /// Appended transaction.
        txn: BookTransaction,
    },
}

impl Op {
    /// Book this op concerns.
    pub fn book_id(&self) -> BookId {
        match self {
            Self::CreateBook { book } => book.id,
            Self::UpdateBook { id, .. } | Self::DeleteBook { id } => *id,
            Self::CheckOut { txn } | Self::CheckIn { txn } | Self::RecordTransaction { txn } => {
                txn.book_id
            }
        }
    }

    /// True for check-out and check-in.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::CheckOut { .. } | Self::CheckIn { .. })
    }
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
