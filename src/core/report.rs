use serde::{Deserialize, Serialize};

use crate::types::BookStatus;

use super::books::BookTable;

/// Book counts by availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub available: usize,
    pub checked_out: usize,
}

impl StatusReport {
    pub fn from_books(books: &BookTable) -> Self {
        Self {
            available: books.count_by_status(BookStatus::Available),
            checked_out: books.count_by_status(BookStatus::CheckedOut),
        }
    }

    pub fn total(&self) -> usize {
        self.available + self.checked_out
    }
}
