use proptest::prelude::*;

use booklog::{
    book::{BookDraft, BookPatch},
    core::store::LibraryStore,
    op::StoredOp,
    time::parse_due_date,
    transaction::TransactionDraft,
    types::{BookId, BookStatus, TransactionType},
};

#[derive(Debug, Clone)]
enum Action {
    Create { title_idx: u8 },
    Retitle { target: u8, title_idx: u8 },
    Delete { target: u8 },
    CheckOut { target: u8, user: u8 },
    CheckIn { target: u8 },
    Record { target: u8, check_in: bool },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0u8..32).prop_map(|title_idx| Action::Create { title_idx }),
        1 => (0u8..12, 0u8..32).prop_map(|(target, title_idx)| Action::Retitle { target, title_idx }),
        1 => (0u8..12).prop_map(|target| Action::Delete { target }),
        3 => (0u8..12, 0u8..4).prop_map(|(target, user)| Action::CheckOut { target, user }),
        3 => (0u8..12).prop_map(|target| Action::CheckIn { target }),
        1 => (0u8..12, any::<bool>()).prop_map(|(target, check_in)| Action::Record { target, check_in }),
    ]
}

fn draft(title_idx: u8) -> BookDraft {
    BookDraft {
        title: format!("Title {title_idx}"),
        author: "Author".to_string(),
        isbn: "0-306-40615-2".to_string(),
        description: "Generated".to_string(),
    }
}

/// Applies `action`, returning the journal op when it succeeded.
fn apply(store: &mut LibraryStore, action: &Action) -> Option<StoredOp> {
    let due = parse_due_date("2031-06-01").ok()?;
    let id = |target: &u8| BookId::from(*target) + 1;
    match action {
        Action::Create { title_idx } => store.create_book(draft(*title_idx)).ok().map(|(_, op)| op),
        Action::Retitle { target, title_idx } => store
            .update_book(
                id(target),
                BookPatch {
                    title: Some(format!("Retitled {title_idx}")),
                    ..BookPatch::default()
                },
            )
            .ok()
            .map(|(_, op)| op),
        Action::Delete { target } => store.delete_book(id(target)).ok().map(|(_, op)| op),
        Action::CheckOut { target, user } => store
            .check_out(id(target), format!("user-{user}"), due)
            .ok()
            .map(|(_, op)| op),
        Action::CheckIn { target } => store.check_in(id(target)).ok().map(|(_, op)| op),
        Action::Record { target, check_in } => store
            .record_transaction(TransactionDraft {
                book_id: id(target),
                transaction_type: if *check_in {
                    TransactionType::CheckIn
                } else {
                    TransactionType::CheckOut
                },
                user_id: None,
                due_date: None,
                notes: Some("manual".to_string()),
            })
            .ok()
            .map(|(_, op)| op),
    }
}

proptest! {
    #[test]
    fn random_actions_preserve_status_invariant(actions in prop::collection::vec(action_strategy(), 1..120)) {
        let mut store = LibraryStore::new();

        for action in &actions {
            let seq_before = store.latest_op_seq();
            let applied = apply(&mut store, action);
            match applied {
                Some(op) => {
                    prop_assert_eq!(op.seq, seq_before + 1);
                }
                None => {
                    prop_assert_eq!(store.latest_op_seq(), seq_before);
                }
            }

            for book in store.books().iter() {
                prop_assert!(book.is_consistent(), "inconsistent book {:?}", book);
            }

            let report = store.status_report();
            prop_assert_eq!(report.total(), store.books().len());
            prop_assert_eq!(report.checked_out, store.count_by_status(BookStatus::CheckedOut));
        }
    }

    #[test]
    fn history_is_newest_first_and_covers_the_ledger(actions in prop::collection::vec(action_strategy(), 1..120)) {
        let mut store = LibraryStore::new();
        for action in &actions {
            let _ = apply(&mut store, action);
        }

        let mut seen = 0usize;
        for book_id in 1..=13u64 {
            let history = store.history(book_id);
            for pair in history.windows(2) {
                prop_assert!(
                    (pair[0].timestamp, pair[0].id) > (pair[1].timestamp, pair[1].id),
                    "history out of order for book {}", book_id
                );
            }
            prop_assert!(history.iter().all(|t| t.book_id == book_id));
            seen += history.len();
        }
        prop_assert_eq!(seen, store.ledger().len());
    }

    #[test]
    fn replaying_ops_reproduces_the_store(actions in prop::collection::vec(action_strategy(), 1..80)) {
        let mut store = LibraryStore::new();
        let mut ops = Vec::new();
        for action in &actions {
            if let Some(op) = apply(&mut store, action) {
                ops.push(op);
            }
        }

        let mut replayed = LibraryStore::new();
        for op in ops {
            replayed.apply_replayed_op(op).expect("replay");
        }

        prop_assert_eq!(replayed.export_snapshot(), store.export_snapshot());
    }
}
