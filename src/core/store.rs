use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    book::{BookDraft, BookPatch, BookRecord},
    op::{Op, StoredOp},
    time,
    transaction::{BookTransaction, TransactionDraft},
    types::{BookId, BookStatus, OpSeq, TransactionId},
    validate::ValidationReport,
};

use super::{
    books::BookTable,
    ledger::TransactionLog,
    lifecycle::{Lifecycle, Transition},
    report::StatusReport,
};

/// Caller-facing classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InvalidTransition,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("book {0} not found")]
    BookNotFound(BookId),
    #[error("validation failed: {0}")]
    Validation(ValidationReport),
    #[error("book {id} is already {}", held_state(.status))]
    InvalidTransition { id: BookId, status: BookStatus },
    #[error("book {0} already exists")]
    AlreadyExists(BookId),
    #[error("transaction {0} already exists")]
    DuplicateTransaction(TransactionId),
}

fn held_state(status: &BookStatus) -> &'static str {
    match status {
        BookStatus::CheckedOut => "checked out",
        BookStatus::Available => "checked in",
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BookNotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::AlreadyExists(_) | Self::DuplicateTransaction(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    pub next_book_id: BookId,
    pub next_transaction_id: TransactionId,
    pub next_op_seq: OpSeq,
    pub books: Vec<BookRecord>,
    pub transactions: Vec<BookTransaction>,
}

#[derive(Debug)]
pub struct LibraryStore {
    books: BookTable,
    ledger: TransactionLog,
    next_op_seq: OpSeq,
}

impl Default for LibraryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryStore {
    pub fn new() -> Self {
        Self {
            books: BookTable::new(),
            ledger: TransactionLog::new(),
            next_op_seq: 1,
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, StoreError> {
        Ok(Self {
            books: BookTable::from_records(snapshot.books, snapshot.next_book_id)?,
            ledger: TransactionLog::from_entries(
                snapshot.transactions,
                snapshot.next_transaction_id,
            )?,
            next_op_seq: snapshot.next_op_seq,
        })
    }

    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        StoreSnapshotV1 {
            next_book_id: self.books.next_id(),
            next_transaction_id: self.ledger.next_id(),
            next_op_seq: self.next_op_seq,
            books: self.books.iter().cloned().collect(),
            transactions: self.ledger.iter().cloned().collect(),
        }
    }

    pub fn create_book(&mut self, draft: BookDraft) -> Result<(BookRecord, StoredOp), StoreError> {
        let book = self.books.create(draft, time::now())?;
        let stored = self.record(Op::CreateBook { book: book.clone() });
        Ok((book, stored))
    }

    pub fn update_book(
        &mut self,
        id: BookId,
        patch: BookPatch,
    ) -> Result<(BookRecord, StoredOp), StoreError> {
        let now = time::now();
        let book = self.books.update(id, &patch, now)?;
        let stored = self.record(Op::UpdateBook {
            id,
            patch,
            updated_at: now,
        });
        Ok((book, stored))
    }

    pub fn delete_book(&mut self, id: BookId) -> Result<((), StoredOp), StoreError> {
        self.books.delete(id)?;
        let stored = self.record(Op::DeleteBook { id });
        Ok(((), stored))
    }

    pub fn check_out(
        &mut self,
        id: BookId,
        user_id: String,
        due_date: DateTime<Utc>,
    ) -> Result<(BookRecord, StoredOp), StoreError> {
        let Transition { book, txn } = Lifecycle::new(&mut self.books, &mut self.ledger)
            .check_out(id, user_id, due_date, time::now())?;
        let stored = self.record(Op::CheckOut { txn });
        Ok((book, stored))
    }

    pub fn check_in(&mut self, id: BookId) -> Result<(BookRecord, StoredOp), StoreError> {
        let Transition { book, txn } =
            Lifecycle::new(&mut self.books, &mut self.ledger).check_in(id, time::now())?;
        let stored = self.record(Op::CheckIn { txn });
        Ok((book, stored))
    }

    pub fn record_transaction(
        &mut self,
        draft: TransactionDraft,
    ) -> Result<(BookTransaction, StoredOp), StoreError> {
        let txn = self.ledger.append(&self.books, draft, time::now())?;
        let stored = self.record(Op::RecordTransaction { txn: txn.clone() });
        Ok((txn, stored))
    }

    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        match stored.op {
            Op::CreateBook { book } => self.books.insert(book)?,
            Op::UpdateBook {
                id,
                patch,
                updated_at,
            } => {
                self.books.apply_patch(id, &patch, updated_at)?;
            }
            Op::DeleteBook { id } => {
                self.books.delete(id)?;
            }
            Op::CheckOut { txn } | Op::CheckIn { txn } => {
                Lifecycle::new(&mut self.books, &mut self.ledger).replay(txn)?;
            }
            Op::RecordTransaction { txn } => {
                self.books.require(txn.book_id)?;
                self.ledger.commit(txn)?;
            }
        }
        self.bump_next_seq_from(stored.seq);
        Ok(())
    }

    pub fn get_book(&self, id: BookId) -> Result<&BookRecord, StoreError> {
        self.books.require(id)
    }

    pub fn get_book_cloned(&self, id: BookId) -> Result<BookRecord, StoreError> {
        self.get_book(id).cloned()
    }

    pub fn list_books_cloned(&self, status: Option<BookStatus>) -> Vec<BookRecord> {
        match status {
            Some(status) => self.books.list_by_status(status),
            None => self.books.list(),
        }
        .into_iter()
        .cloned()
        .collect()
    }

    pub fn count_by_status(&self, status: BookStatus) -> usize {
        self.books.count_by_status(status)
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::from_books(&self.books)
    }

    pub fn history(&self, book_id: BookId) -> Vec<&BookTransaction> {
        self.ledger.history(book_id)
    }

    pub fn history_cloned(&self, book_id: BookId) -> Vec<BookTransaction> {
        self.history(book_id).into_iter().cloned().collect()
    }

    pub fn books(&self) -> &BookTable {
        &self.books
    }

    pub fn ledger(&self) -> &TransactionLog {
        &self.ledger
    }

    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn record(&mut self, op: Op) -> StoredOp {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        StoredOp {
            seq,
            ts_ms: time::now_ms(),
            op,
        }
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}
