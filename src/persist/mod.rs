pub mod sqlite;

use thiserror::Error;

use crate::{
    core::store::{StoreError, StoreSnapshotV1},
    op::StoredOp,
    types::OpSeq,
};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("replay error: {0}")]
    Replay(#[from] StoreError),
    #[error("{0}")]
    Message(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

pub trait OpSink: Send {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
