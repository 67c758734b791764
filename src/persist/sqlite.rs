//! SQLite-backed append-only op journal sink.
//!
//! Besides the `events` journal, every appended op is projected into the
//! relational `books` and `book_transactions` tables inside the same SQLite
//! transaction, so the two never disagree.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::{Deserialize, Serialize};

use crate::{
    book::BookRecord,
    core::store::{LibraryStore, StoreSnapshotV1},
    op::{Op, StoredOp, StoredOpEnvelope},
    time,
    transaction::BookTransaction,
    types::{BookId, BookStatus, OpSeq, TransactionType},
};

use super::{OpSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// SQLite implementation of [`crate::persist::OpSink`].
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens or creates a SQLite-backed sink at `path`.
    ///
    /// Enables WAL mode, sets `synchronous=NORMAL` and turns off foreign key
    /// enforcement so a book's transactions outlive its row.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite sink.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Loads store state from latest snapshot plus tail events.
    pub fn load_store(&self) -> PersistResult<LibraryStore> {
        let mut store = if let Some(snapshot) = self.load_latest_snapshot()? {
            LibraryStore::from_snapshot(snapshot)?
        } else {
            LibraryStore::new()
        };

        let events = self.load_events_after(store.latest_op_seq())?;
        for event in events {
            store.apply_replayed_op(event)?;
        }
        Ok(store)
    }

    /// Loads events strictly after `seq`.
    pub fn load_events_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, ts_ms, payload FROM events WHERE seq > ?1 ORDER BY seq ASC")?;

        let rows = stmt.query_map(params![seq as i64], |row| {
            let seq: i64 = row.get(0)?;
            let ts_ms: i64 = row.get(1)?;
            let payload: Vec<u8> = row.get(2)?;
            let mut op = decode_stored_op_payload(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err)),
                )
            })?;
            op.seq = seq as OpSeq;
            op.ts_ms = ts_ms as u64;
            Ok(op)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Reads the materialized `books` table in id order.
    pub fn load_books_table(&self) -> PersistResult<Vec<BookRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, author, isbn, description, status, checked_out_by, due_date, \
             created_at, updated_at FROM books ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], book_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Reads one book's rows from `book_transactions`, most recent first.
    pub fn load_transactions_table(&self, book_id: BookId) -> PersistResult<Vec<BookTransaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, book_id, transaction_type, user_id, due_date, timestamp, notes \
             FROM book_transactions WHERE book_id = ?1 ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![book_id as i64], transaction_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Writes a snapshot covering `last_seq`.
    pub fn write_snapshot(
        &mut self,
        snapshot: &StoreSnapshotV1,
        last_seq: OpSeq,
    ) -> PersistResult<()> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        let payload = serde_json::to_vec(&env)?;
        self.conn.execute(
            "INSERT INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![last_seq as i64, time::now_ms() as i64, payload],
        )?;
        Ok(())
    }

    /// Deletes events up to and including `seq`.
    pub fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        let count = self
            .conn
            .execute("DELETE FROM events WHERE seq <= ?1", params![seq as i64])?;
        Ok(count)
    }

    /// Returns the latest sequence persisted in the events table.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM events", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0) as OpSeq)
    }

    fn load_latest_snapshot(&self) -> PersistResult<Option<StoreSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::Message(
                "unsupported snapshot format".to_string(),
            ));
        }
        Ok(Some(env.snapshot))
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        if ops.is_empty() {
            return self.latest_seq();
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events(seq, ts_ms, kind, book_id, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for stored in ops {
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                stmt.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    op_kind(&stored.op),
                    stored.op.book_id() as i64,
                    payload,
                ])?;
                project_op(&tx, &stored.op)?;
            }
        }
        tx.commit()?;

        Ok(ops.last().map(|o| o.seq).unwrap_or(0))
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        SqliteOpSink::write_snapshot(self, snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        SqliteOpSink::compact_through(self, seq)
    }
}

fn project_op(tx: &Transaction<'_>, op: &Op) -> PersistResult<()> {
    match op {
        Op::CreateBook { book } => {
            tx.execute(
                "INSERT INTO books(id, title, author, isbn, description, status, checked_out_by, \
                 due_date, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    book.id as i64,
                    book.title,
                    book.author,
                    book.isbn,
                    book.description,
                    book.status.as_str(),
                    book.checked_out_by,
                    book.due_date.map(ts_text),
                    ts_text(book.created_at),
                    ts_text(book.updated_at),
                ],
            )?;
        }
        Op::UpdateBook {
            id,
            patch,
            updated_at,
        } => {
            tx.execute(
                "UPDATE books SET title = COALESCE(?2, title), author = COALESCE(?3, author), \
                 isbn = COALESCE(?4, isbn), description = COALESCE(?5, description), \
                 updated_at = ?6 WHERE id = ?1",
                params![
                    *id as i64,
                    patch.title,
                    patch.author,
                    patch.isbn,
                    patch.description,
                    ts_text(*updated_at),
                ],
            )?;
        }
        Op::DeleteBook { id } => {
            tx.execute("DELETE FROM books WHERE id = ?1", params![*id as i64])?;
        }
        Op::CheckOut { txn } => {
            tx.execute(
                "UPDATE books SET status = ?2, checked_out_by = ?3, due_date = ?4, updated_at = ?5 \
                 WHERE id = ?1",
                params![
                    txn.book_id as i64,
                    BookStatus::CheckedOut.as_str(),
                    txn.user_id,
                    txn.due_date.map(ts_text),
                    ts_text(txn.timestamp),
                ],
            )?;
            insert_transaction_row(tx, txn)?;
        }
        Op::CheckIn { txn } => {
            tx.execute(
                "UPDATE books SET status = ?2, checked_out_by = NULL, due_date = NULL, \
                 updated_at = ?3 WHERE id = ?1",
                params![
                    txn.book_id as i64,
                    BookStatus::Available.as_str(),
                    ts_text(txn.timestamp),
                ],
            )?;
            insert_transaction_row(tx, txn)?;
        }
        Op::RecordTransaction { txn } => {
            insert_transaction_row(tx, txn)?;
        }
    }
    Ok(())
}

fn insert_transaction_row(tx: &Transaction<'_>, txn: &BookTransaction) -> PersistResult<()> {
    tx.execute(
        "INSERT INTO book_transactions(id, book_id, transaction_type, user_id, due_date, \
         timestamp, notes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            txn.id as i64,
            txn.book_id as i64,
            txn.transaction_type.as_str(),
            txn.user_id,
            txn.due_date.map(ts_text),
            ts_text(txn.timestamp),
            txn.notes,
        ],
    )?;
    Ok(())
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<BookRecord> {
    let status: String = row.get(5)?;
    Ok(BookRecord {
        id: row.get::<_, i64>(0)? as BookId,
        title: row.get(1)?,
        author: row.get(2)?,
        isbn: row.get(3)?,
        description: row.get(4)?,
        status: BookStatus::parse(&status).ok_or_else(|| bad_text(5, &status))?,
        checked_out_by: row.get(6)?,
        due_date: opt_ts_col(row, 7)?,
        created_at: ts_col(row, 8)?,
        updated_at: ts_col(row, 9)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<BookTransaction> {
    let kind: String = row.get(2)?;
    Ok(BookTransaction {
        id: row.get::<_, i64>(0)? as u64,
        book_id: row.get::<_, i64>(1)? as BookId,
        transaction_type: TransactionType::parse(&kind).ok_or_else(|| bad_text(2, &kind))?,
        user_id: row.get(3)?,
        due_date: opt_ts_col(row, 4)?,
        timestamp: ts_col(row, 5)?,
        notes: row.get(6)?,
    })
}

fn op_kind(op: &Op) -> i64 {
    match op {
        Op::CreateBook { .. } => 1,
        Op::UpdateBook { .. } => 2,
        Op::DeleteBook { .. } => 3,
        Op::CheckOut { .. } => 4,
        Op::CheckIn { .. } => 5,
        Op::RecordTransaction { .. } => 6,
    }
}

/// Fixed-width UTC text so lexical order matches time order.
fn ts_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| parse_ts(idx, &raw)).transpose()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| bad_text(idx, raw))
}

fn bad_text(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(format!("unexpected column value `{raw}`"))),
    )
}

fn decode_stored_op_payload(payload: &[u8]) -> Result<StoredOp, String> {
    let envelope = serde_json::from_slice::<StoredOpEnvelope>(payload)
        .map_err(|e| format!("op payload decode failed: {e}"))?;
    if envelope.format_version != crate::op::OP_FORMAT_VERSION {
        return Err(format!(
            "unsupported op format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.stored)
}
