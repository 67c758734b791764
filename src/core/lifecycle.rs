use chrono::{DateTime, Utc};

use crate::{
    book::BookRecord,
    transaction::{BookTransaction, TransactionDraft},
    types::{BookId, BookStatus, TransactionType},
    validate,
};

use super::{books::BookTable, ledger::TransactionLog, store::StoreError};

/// Outcome of a successful check-out or check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Book after the transition.
    pub book: BookRecord,
    /// Entry appended for it.
    pub txn: BookTransaction,
}

/// Two-state machine over book status that keeps the book table and the
/// transaction log in step.
///
/// All preconditions are checked before anything is touched; once they pass,
/// the book mutation and the log append cannot fail.
pub struct Lifecycle<'a> {
    books: &'a mut BookTable,
    ledger: &'a mut TransactionLog,
}

impl<'a> Lifecycle<'a> {
    pub fn new(books: &'a mut BookTable, ledger: &'a mut TransactionLog) -> Self {
        Self { books, ledger }
    }

    /// AVAILABLE -> CHECKED_OUT.
    pub fn check_out(
        &mut self,
        id: BookId,
        user_id: String,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        let book = self.books.require(id)?;
        expect_status(book, BookStatus::Available)?;
        validate::validate_user_id(&user_id).map_err(StoreError::Validation)?;

        let txn = self
            .ledger
            .stage(TransactionDraft::check_out(id, user_id, due_date), now);
        self.commit(txn)
    }

    /// CHECKED_OUT -> AVAILABLE; the entry records the previous holder.
    pub fn check_in(&mut self, id: BookId, now: DateTime<Utc>) -> Result<Transition, StoreError> {
        let book = self.books.require(id)?;
        expect_status(book, BookStatus::CheckedOut)?;
        let previous_holder = book.checked_out_by.clone();

        let txn = self
            .ledger
            .stage(TransactionDraft::check_in(id, previous_holder), now);
        self.commit(txn)
    }

    /// Re-applies a journaled lifecycle entry.
    pub fn replay(&mut self, txn: BookTransaction) -> Result<Transition, StoreError> {
        if self.ledger.contains(txn.id) {
            return Err(StoreError::DuplicateTransaction(txn.id));
        }
        let book = self.books.require(txn.book_id)?;
        match txn.transaction_type {
            TransactionType::CheckOut => expect_status(book, BookStatus::Available)?,
            TransactionType::CheckIn => expect_status(book, BookStatus::CheckedOut)?,
        }
        self.commit(txn)
    }

    fn commit(&mut self, txn: BookTransaction) -> Result<Transition, StoreError> {
        let book = self.books.get_mut(txn.book_id)?;
        match txn.transaction_type {
            TransactionType::CheckOut => {
                book.status = BookStatus::CheckedOut;
                book.checked_out_by = txn.user_id.clone();
                book.due_date = txn.due_date;
            }
            TransactionType::CheckIn => {
                book.status = BookStatus::Available;
                book.checked_out_by = None;
                book.due_date = None;
            }
        }
        book.updated_at = txn.timestamp;
        let book = book.clone();
        self.ledger.commit(txn.clone())?;
        Ok(Transition { book, txn })
    }
}

fn expect_status(book: &BookRecord, expected: BookStatus) -> Result<(), StoreError> {
    if book.status == expected {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: book.id,
            status: book.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{book::BookDraft, time};

    fn setup() -> (BookTable, TransactionLog) {
        let mut books = BookTable::new();
        books
            .create(
                BookDraft {
                    title: "T".to_string(),
                    author: "A".to_string(),
                    isbn: "978-3-16-148410-0".to_string(),
                    description: "D".to_string(),
                },
                time::now(),
            )
            .unwrap();
        (books, TransactionLog::new())
    }

    #[test]
    fn check_out_then_in_round_trips_status_and_logs_holder_twice() {
        let (mut books, mut ledger) = setup();
        let due = time::parse_due_date("2024-01-15").unwrap();
        let mut lc = Lifecycle::new(&mut books, &mut ledger);

        let out = lc.check_out(1, "u1".to_string(), due, time::now()).unwrap();
        assert_eq!(out.book.status, BookStatus::CheckedOut);
        assert_eq!(out.book.checked_out_by.as_deref(), Some("u1"));
        assert_eq!(out.txn.due_date, Some(due));

        let back = lc.check_in(1, time::now()).unwrap();
        assert_eq!(back.book.status, BookStatus::Available);
        assert!(back.book.is_consistent());
        assert_eq!(back.txn.user_id.as_deref(), Some("u1"));
        assert_eq!(back.txn.due_date, None);

        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn blank_user_is_rejected_without_side_effects() {
        let (mut books, mut ledger) = setup();
        let mut lc = Lifecycle::new(&mut books, &mut ledger);
        let err = lc.check_out(1, " ".to_string(), time::now(), time::now());
        assert!(matches!(err, Err(StoreError::Validation(_))));
        assert_eq!(books.get(1).unwrap().status, BookStatus::Available);
        assert_eq!(ledger.next_id(), 1);
    }

    #[test]
    fn replay_refuses_out_of_order_entries() {
        let (mut books, mut ledger) = setup();
        let mut lc = Lifecycle::new(&mut books, &mut ledger);
        let stray = BookTransaction {
            id: 1,
            book_id: 1,
            transaction_type: TransactionType::CheckIn,
            user_id: Some("u1".to_string()),
            due_date: None,
            timestamp: time::now(),
            notes: None,
        };
        assert_eq!(
            lc.replay(stray),
            Err(StoreError::InvalidTransition {
                id: 1,
                status: BookStatus::Available
            })
        );
    }
}
