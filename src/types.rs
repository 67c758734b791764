//! Shared primitive IDs and status enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic book identifier.
pub type BookId = u64;
/// Monotonic transaction identifier.
pub type TransactionId = u64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;

/// Availability of a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    /// On the shelf.
    #[default]
    Available,
    /// Held by a patron until the due date.
    CheckedOut,
}

impl BookStatus {
    /// Stable lowercase name used on the wire and in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::CheckedOut => "checked_out",
        }
    }

    /// Inverse of [`BookStatus::as_str`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "available" => Some(Self::Available),
            "checked_out" => Some(Self::CheckedOut),
            _ => None,
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of lifecycle event recorded in the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Book left the library.
    CheckOut,
    /// Book came back.
    CheckIn,
}

impl TransactionType {
    /// Stable lowercase name used on the wire and in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckOut => "check_out",
            Self::CheckIn => "check_in",
        }
    }

    /// Inverse of [`TransactionType::as_str`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "check_out" => Some(Self::CheckOut),
            "check_in" => Some(Self::CheckIn),
            _ => None,
        }
    }
}
