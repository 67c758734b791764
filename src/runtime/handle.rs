use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};

use crate::{
    book::{BookDraft, BookPatch, BookRecord},
    core::{
        report::StatusReport,
        store::{ErrorKind, LibraryStore, StoreError, StoreSnapshotV1},
    },
    op::StoredOp,
    persist::{OpSink, PersistError},
    transaction::{BookTransaction, TransactionDraft},
    types::{BookId, BookStatus, OpSeq},
};

use super::events::LibraryEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),
    #[error("library runtime is not running")]
    ChannelClosed,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(err) => err.kind(),
            Self::Persist(_) | Self::ChannelClosed => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub flush_on_lifecycle: bool,
    pub batch_max_ops: usize,
    pub batch_max_latency_ms: u64,
    pub persist_queue_bound: usize,
    pub snapshot_every_ops: usize,
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_lifecycle: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

#[derive(Clone)]
pub struct LibraryHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<LibraryEvent>,
}

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum Command {
    CreateBook {
        draft: BookDraft,
        resp: Reply<BookRecord>,
    },
    UpdateBook {
        id: BookId,
        patch: BookPatch,
        resp: Reply<BookRecord>,
    },
    DeleteBook {
        id: BookId,
        resp: Reply<()>,
    },
    CheckOut {
        id: BookId,
        user_id: String,
        due_date: DateTime<Utc>,
        resp: Reply<BookRecord>,
    },
    CheckIn {
        id: BookId,
        resp: Reply<BookRecord>,
    },
    RecordTransaction {
        draft: TransactionDraft,
        resp: Reply<BookTransaction>,
    },
    GetBook {
        id: BookId,
        resp: Reply<BookRecord>,
    },
    ListBooks {
        status: Option<BookStatus>,
        resp: Reply<Vec<BookRecord>>,
    },
    History {
        book_id: BookId,
        resp: Reply<Vec<BookTransaction>>,
    },
    StatusReport {
        resp: Reply<StatusReport>,
    },
    Flush {
        resp: Reply<OpSeq>,
    },
    Checkpoint {
        resp: Reply<()>,
    },
    Shutdown {
        resp: Reply<()>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
}

/// Spawns the writer task that owns `store`, returning a handle to it.
///
/// With `sink` set, ops are batched to it on a separate persistence task;
/// otherwise every op counts as durable as soon as it is applied.
///
/// A batch the sink rejects stays queued and is retried on the next flush.
/// Until one succeeds the writer refuses new mutations, so nothing is
/// acknowledged on top of a gap in the journal.
pub fn spawn_library(
    store: LibraryStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> LibraryHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<LibraryEvent>(1024);

    let journal_behind = Arc::new(AtomicBool::new(false));
    let (persist_tx, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        spawn_persistence_worker(
            sink,
            persist_rx,
            durable_tx,
            Arc::clone(&journal_behind),
            config.clone(),
        );
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        let mut ops_since_snapshot = 0usize;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    let done = handle_command(
                        cmd,
                        &mut store,
                        &events_tx_loop,
                        persist_tx.as_ref(),
                        &journal_behind,
                        &config,
                        &mut ops_since_snapshot,
                    ).await;
                    if done {
                        break;
                    }
                }
                durable = recv_durable(&mut durable_rx) => {
                    match durable {
                        Some(Ok(op_seq)) => {
                            let _ = events_tx_loop.send(LibraryEvent::DurableUpTo { op_seq });
                        }
                        Some(Err(err)) => tracing::warn!(error = %err, "journal append failed"),
                        None => durable_rx = None,
                    }
                }
            }
        }
        tracing::debug!("library writer stopped");
    });

    LibraryHandle { cmd_tx, events_tx }
}

async fn recv_durable(
    rx: &mut Option<mpsc::UnboundedReceiver<Result<OpSeq, PersistError>>>,
) -> Option<Result<OpSeq, PersistError>> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl LibraryHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events_tx.subscribe()
    }

    pub async fn create_book(&self, draft: BookDraft) -> Result<BookRecord, RuntimeError> {
        self.request(|resp| Command::CreateBook { draft, resp }).await
    }

    pub async fn update_book(&self, id: BookId, patch: BookPatch) -> Result<BookRecord, RuntimeError> {
        self.request(|resp| Command::UpdateBook { id, patch, resp }).await
    }

    pub async fn delete_book(&self, id: BookId) -> Result<(), RuntimeError> {
        self.request(|resp| Command::DeleteBook { id, resp }).await
    }

    pub async fn check_out(
        &self,
        id: BookId,
        user_id: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Result<BookRecord, RuntimeError> {
        let user_id = user_id.into();
        self.request(|resp| Command::CheckOut {
            id,
            user_id,
            due_date,
            resp,
        })
        .await
    }

    pub async fn check_in(&self, id: BookId) -> Result<BookRecord, RuntimeError> {
        self.request(|resp| Command::CheckIn { id, resp }).await
    }

    pub async fn record_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<BookTransaction, RuntimeError> {
        self.request(|resp| Command::RecordTransaction { draft, resp }).await
    }

    pub async fn get_book(&self, id: BookId) -> Result<BookRecord, RuntimeError> {
        self.request(|resp| Command::GetBook { id, resp }).await
    }

    pub async fn list_books(&self, status: Option<BookStatus>) -> Result<Vec<BookRecord>, RuntimeError> {
        self.request(|resp| Command::ListBooks { status, resp }).await
    }

    pub async fn history(&self, book_id: BookId) -> Result<Vec<BookTransaction>, RuntimeError> {
        self.request(|resp| Command::History { book_id, resp }).await
    }

    pub async fn status_report(&self) -> Result<StatusReport, RuntimeError> {
        self.request(|resp| Command::StatusReport { resp }).await
    }

    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await
    }

    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut LibraryStore,
    events_tx: &broadcast::Sender<LibraryEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    journal_behind: &AtomicBool,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) -> bool {
    let persist = persist_tx.map(|tx| (tx, journal_behind));
    let wrote = match cmd {
        Command::CreateBook { draft, resp } => {
            let res = apply_write(store, events_tx, persist, |s| s.create_book(draft), |book| {
                LibraryEvent::BookCreated { id: book.id }
            });
            reply(resp, res)
        }
        Command::UpdateBook { id, patch, resp } => {
            let res = apply_write(store, events_tx, persist, |s| s.update_book(id, patch), |_| {
                LibraryEvent::BookUpdated { id }
            });
            reply(resp, res)
        }
        Command::DeleteBook { id, resp } => {
            let res = apply_write(store, events_tx, persist, |s| s.delete_book(id), |_| {
                LibraryEvent::BookDeleted { id }
            });
            reply(resp, res)
        }
        Command::CheckOut {
            id,
            user_id,
            due_date,
            resp,
        } => {
            let res = apply_write(
                store,
                events_tx,
                persist,
                |s| s.check_out(id, user_id, due_date),
                |book| LibraryEvent::CheckedOut {
                    id,
                    user_id: book.checked_out_by.clone().unwrap_or_default(),
                },
            );
            reply(resp, res)
        }
        Command::CheckIn { id, resp } => {
            let res = apply_write(store, events_tx, persist, |s| s.check_in(id), |_| {
                LibraryEvent::CheckedIn { id }
            });
            reply(resp, res)
        }
        Command::RecordTransaction { draft, resp } => {
            let res = apply_write(
                store,
                events_tx,
                persist,
                |s| s.record_transaction(draft),
                |txn| LibraryEvent::TransactionRecorded {
                    id: txn.id,
                    book_id: txn.book_id,
                },
            );
            reply(resp, res)
        }
        Command::GetBook { id, resp } => {
            let _ = resp.send(store.get_book_cloned(id).map_err(RuntimeError::from));
            false
        }
        Command::ListBooks { status, resp } => {
            let _ = resp.send(Ok(store.list_books_cloned(status)));
            false
        }
        Command::History { book_id, resp } => {
            let _ = resp.send(Ok(store.history_cloned(book_id)));
            false
        }
        Command::StatusReport { resp } => {
            let _ = resp.send(Ok(store.status_report()));
            false
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx.send(PersistMsg::Flush { resp: flush_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
            false
        }
        Command::Checkpoint { resp } => {
            let out = match persist_tx {
                Some(tx) => request_checkpoint(store, tx, config).await,
                None => Ok(()),
            };
            if out.is_ok() {
                *ops_since_snapshot = 0;
            }
            let _ = resp.send(out);
            false
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(PersistMsg::Shutdown { resp: done_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    done_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(())
            };
            tracing::info!(last_op_seq = store.latest_op_seq(), "library runtime shutting down");
            let _ = resp.send(out);
            return true;
        }
    };

    if wrote {
        *ops_since_snapshot += 1;
        maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
    }
    false
}

/// Sends `res` back and reports whether it was a successful write.
fn reply<T>(resp: Reply<T>, res: Result<T, RuntimeError>) -> bool {
    let ok = res.is_ok();
    let _ = resp.send(res);
    ok
}

/// Runs one mutating store call and hands its op to persistence.
///
/// A persistence queue slot is reserved before the store is touched, so a
/// full queue rejects the command without changing any state. The same holds
/// while a failed journal batch is waiting to be retried.
fn apply_write<T>(
    store: &mut LibraryStore,
    events_tx: &broadcast::Sender<LibraryEvent>,
    persist: Option<(&mpsc::Sender<PersistMsg>, &AtomicBool)>,
    apply: impl FnOnce(&mut LibraryStore) -> Result<(T, StoredOp), StoreError>,
    event: impl FnOnce(&T) -> LibraryEvent,
) -> Result<T, RuntimeError> {
    let permit = persist
        .map(|(tx, journal_behind)| {
            if journal_behind.load(Ordering::Acquire) {
                return Err(RuntimeError::Persist(PersistError::Message(
                    "journal is behind after a failed write; flush to retry".to_string(),
                )));
            }
            tx.try_reserve().map_err(|err| {
                RuntimeError::Persist(PersistError::Message(format!("persist queue error: {err}")))
            })
        })
        .transpose()?;

    let (out, stored) = apply(store)?;
    tracing::debug!(op_seq = stored.seq, book_id = stored.op.book_id(), "applied op");

    match permit {
        Some(permit) => permit.send(PersistMsg::Op(stored)),
        None => {
            let _ = events_tx.send(LibraryEvent::DurableUpTo {
                op_seq: stored.seq,
            });
        }
    }
    let _ = events_tx.send(event(&out));
    Ok(out)
}

async fn request_checkpoint(
    store: &LibraryStore,
    tx: &mpsc::Sender<PersistMsg>,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let (cp_tx, cp_rx) = oneshot::channel();
    tx.send(PersistMsg::Checkpoint {
        snapshot: store.export_snapshot(),
        last_seq: store.latest_op_seq(),
        compact: config.compact_after_snapshot,
        resp: cp_tx,
    })
    .await
    .map_err(|_| RuntimeError::ChannelClosed)?;
    cp_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?
        .map_err(RuntimeError::from)
}

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    journal_behind: Arc<AtomicBool>,
    config: RuntimeConfig,
) {
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let mut last_durable: OpSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        if let Err(err) = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, &journal_behind, true).await {
                            tracing::error!(lost = buf.len(), error = %err, "journal closed with unwritten ops");
                        }
                        break;
                    };

                    match msg {
                        PersistMsg::Op(stored) => {
                            let is_lifecycle = stored.op.is_lifecycle();
                            buf.push(stored);

                            if buf.len() >= config.batch_max_ops || (config.flush_on_lifecycle && is_lifecycle) {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, &journal_behind, true).await;
                                deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, &journal_behind, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let result = match flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, &journal_behind, true).await {
                                Err(err) => Err(err),
                                Ok(()) => write_checkpoint(&sink, snapshot, last_seq, compact).await,
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, &journal_behind, true).await;
                            if let Err(err) = &result {
                                tracing::error!(lost = buf.len(), error = %err, "journal closed with unwritten ops");
                            }
                            let _ = resp.send(result);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, &journal_behind, false).await;
                    deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                }
            }
        }
    });
}

async fn write_checkpoint(
    sink: &Arc<Mutex<Box<dyn OpSink>>>,
    snapshot: StoreSnapshotV1,
    last_seq: OpSeq,
    compact: bool,
) -> Result<(), PersistError> {
    let sink_ref = Arc::clone(sink);
    tokio::task::spawn_blocking(move || -> Result<(), PersistError> {
        let mut sink = sink_ref.blocking_lock();
        sink.write_snapshot(&snapshot, last_seq)?;
        if compact {
            let removed = sink.compact_through(last_seq)?;
            tracing::debug!(last_seq, removed, "compacted journal");
        }
        Ok(())
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}

/// Writes `buf` to the sink as one batch.
///
/// On failure the batch goes back into `buf` and `journal_behind` is raised;
/// a later successful write clears it.
async fn flush_buf(
    sink: &Arc<Mutex<Box<dyn OpSink>>>,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    journal_behind: &AtomicBool,
    call_flush: bool,
) -> Result<(), PersistError> {
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.flush()
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let ops = std::mem::take(buf);
    let count = ops.len();
    let sink_ref = Arc::clone(sink);
    let (ops, appended, flushed) = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let appended = sink.append_ops(&ops);
        let flushed = match &appended {
            Ok(_) if call_flush => sink.flush(),
            _ => Ok(()),
        };
        (ops, appended, flushed)
    })
    .await
    .map_err(|e| {
        journal_behind.store(true, Ordering::Release);
        PersistError::Message(format!("join error: {e}"))
    })?;

    match appended {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            journal_behind.store(false, Ordering::Release);
            tracing::trace!(count, durable = *last_durable, "journal batch written");
            let _ = durable_tx.send(Ok(*last_durable));
            flushed
        }
        Err(err) => {
            tracing::error!(count, error = %err, "journal batch failed, keeping it for retry");
            *buf = ops;
            journal_behind.store(true, Ordering::Release);
            let _ = durable_tx.send(Err(PersistError::Message(format!("append failed: {err}"))));
            Err(err)
        }
    }
}

async fn maybe_auto_checkpoint(
    store: &LibraryStore,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) {
    if config.snapshot_every_ops == 0 || *ops_since_snapshot < config.snapshot_every_ops {
        return;
    }

    let Some(tx) = persist_tx else {
        return;
    };

    match request_checkpoint(store, tx, config).await {
        Ok(()) => *ops_since_snapshot = 0,
        Err(err) => tracing::warn!(error = %err, "automatic checkpoint failed"),
    }
}
