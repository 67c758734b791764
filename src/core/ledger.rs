use chrono::{DateTime, Utc};
use hashbrown::HashMap;

use crate::{
    transaction::{BookTransaction, TransactionDraft},
    types::{BookId, TransactionId},
    validate,
};

use super::{books::BookTable, indices::VecIndex, store::StoreError};

/// Append-only transaction log with a per-book index.
#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
    entries: HashMap<TransactionId, BookTransaction>,
    order: Vec<TransactionId>,
    by_book: VecIndex<BookId>,
    next_id: TransactionId,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a log from entries in append order.
    pub fn from_entries(
        entries: Vec<BookTransaction>,
        next_id: TransactionId,
    ) -> Result<Self, StoreError> {
        let mut log = Self {
            next_id,
            ..Self::default()
        };
        for txn in entries {
            log.commit(txn)?;
        }
        Ok(log)
    }

    /// Validates `draft` against `books` and appends it.
    pub fn append(
        &mut self,
        books: &BookTable,
        draft: TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<BookTransaction, StoreError> {
        books.require(draft.book_id)?;
        validate::validate_transaction(&draft).map_err(StoreError::Validation)?;
        let txn = self.stage(draft, now);
        self.commit(txn.clone())?;
        Ok(txn)
    }

    /// Materializes `draft` with a fresh id without making it visible.
    pub(crate) fn stage(&mut self, draft: TransactionDraft, now: DateTime<Utc>) -> BookTransaction {
        let id = self.next_id;
        self.next_id += 1;
        BookTransaction {
            id,
            book_id: draft.book_id,
            transaction_type: draft.transaction_type,
            user_id: draft.user_id,
            due_date: draft.due_date,
            timestamp: now,
            notes: draft.notes,
        }
    }

    /// Makes a staged or replayed entry visible.
    pub(crate) fn commit(&mut self, txn: BookTransaction) -> Result<(), StoreError> {
        if self.entries.contains_key(&txn.id) {
            return Err(StoreError::DuplicateTransaction(txn.id));
        }
        self.next_id = self.next_id.max(txn.id.saturating_add(1));
        self.by_book.entry(txn.book_id).or_default().push(txn.id);
        self.order.push(txn.id);
        self.entries.insert(txn.id, txn);
        Ok(())
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Entries for `book_id`, most recent first.
    ///
    /// Equal timestamps fall back to descending id.
    pub fn history(&self, book_id: BookId) -> Vec<&BookTransaction> {
        let mut out: Vec<&BookTransaction> = self
            .by_book
            .get(&book_id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.entries.get(id))
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        out
    }

    /// All entries in append order.
    pub fn iter(&self) -> impl Iterator<Item = &BookTransaction> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_id(&self) -> TransactionId {
        self.next_id
    }
}
