//! Runtime event stream payloads.

use crate::types::{BookId, OpSeq, TransactionId};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// A new book was created.
    BookCreated {
        /// Created book id.
        id: BookId,
    },
    /// Book metadata was updated.
    BookUpdated {
        /// Updated book id.
        id: BookId,
    },
    /// A book was deleted.
    BookDeleted {
        /// Deleted book id.
        id: BookId,
    },
    /// A book was checked out.
    CheckedOut {
        /// Book id.
        id: BookId,
        /// Holder.
        user_id: String,
    },
    /// A book was checked in.
    CheckedIn {
        /// Book id.
        id: BookId,
    },
    /// A transaction was recorded manually.
    TransactionRecorded {
        /// Transaction id.
        id: TransactionId,
        /// Book it references.
        book_id: BookId,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
