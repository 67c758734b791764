//! Library book tracking with an authoritative in-memory store and an
//! append-only SQLite journal.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::LibraryStore`]:
//! ```
//! use booklog::{book::BookDraft, core::store::LibraryStore, types::BookStatus};
//!
//! let mut store = LibraryStore::new();
//! let (book, _op) = store.create_book(BookDraft {
//!     title: "Dune".to_string(),
//!     author: "Frank Herbert".to_string(),
//!     isbn: "9780441013593".to_string(),
//!     description: "Desert planet".to_string(),
//! }).expect("create");
//! assert_eq!(book.id, 1);
//!
//! let due = booklog::time::parse_due_date("2030-01-01").expect("date");
//! let (book, _op) = store.check_out(book.id, "u1".to_string(), due).expect("check out");
//! assert_eq!(book.status, BookStatus::CheckedOut);
//! assert_eq!(store.status_report().checked_out, 1);
//! ```
//!
//! Runtime usage with SQLite sink:
//! ```no_run
//! use booklog::{
//!     book::BookDraft,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_library, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("booklog.db").expect("open sqlite");
//! let store = sink.load_store().expect("replay");
//! let handle = spawn_library(store, Some(Box::new(sink)), RuntimeConfig::default());
//! let book = handle.create_book(BookDraft {
//!     title: "Dune".to_string(),
//!     author: "Frank Herbert".to_string(),
//!     isbn: "9780441013593".to_string(),
//!     description: "Desert planet".to_string(),
//! }).await.expect("create");
//! handle.check_in(book.id).await.expect_err("not checked out");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Book records and metadata patches.
pub mod book;
/// Core in-memory store, lifecycle and reporting.
pub mod core;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// HTTP API.
pub mod server;
/// Clock and due-date parsing helpers.
pub mod time;
/// Transaction log entries.
pub mod transaction;
/// Shared primitive types and enums.
pub mod types;
/// Payload validation.
pub mod validate;
