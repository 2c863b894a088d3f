//! # Connection worker.
//!
//! One named thread owns the SQLite connection and serves [`Command`]s in arrival
//! order. Store handles never touch the connection; they enqueue a command and
//! await its reply.
//!
//! ```text
//! Store::{query, with_connection} ── Call ──┐
//! RowStream (first poll)          ── Stream ┼──► queue ──► worker thread ──► Connection
//! Store::close                    ── Close ─┘                  │
//!                                                  replies / rows channels
//! ```
//!
//! ## Streams and interleaving
//! A stream is served by stepping its cursor and handing rows to a bounded channel.
//! While that channel is full the worker keeps serving the queue, so a paused
//! consumer never blocks other operations, including ones issued by the same task.
//! A stream opened while another one is waiting is served inside it; the outer
//! stream resumes once the inner one finishes or is dropped.
//!
//! ## Release
//! The connection is closed when a `Close` command arrives or when every handle is
//! gone. Live and queued streams are ended with a "store closed" item; queued
//! calls fail with the same error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rusqlite::{Connection, params_from_iter};
use tokio::sync::{mpsc, oneshot};
use tracing::Span;

use super::{Row, StoreConfig, StoreLocation, Value, closed, column_names};
use crate::core::panic_message;
use crate::error::ResourceError;

/// Item handed to a [`RowStream`](super::RowStream) consumer.
pub(super) type Item = Result<Row, ResourceError>;

/// Operation run on the worker thread; it replies through its own channel.
pub(super) type Job = Box<dyn FnOnce(&Connection) + Send + 'static>;

/// Work item for the connection worker.
pub(super) enum Command {
    Call(Job),
    Stream(StreamRequest),
    Close(oneshot::Sender<Result<(), ResourceError>>),
}

pub(super) struct StreamRequest {
    pub(super) sql: String,
    pub(super) params: Vec<Value>,
    pub(super) span: Span,
    pub(super) rows: mpsc::Sender<Item>,
}

/// Opens the connection on a dedicated thread and returns its command queue.
pub(super) async fn spawn(
    config: &StoreConfig,
    released: Arc<AtomicBool>,
) -> Result<mpsc::UnboundedSender<Command>, ResourceError> {
    let (commands, queue) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let cfg = config.clone();

    thread::Builder::new()
        .name("reqvisor-store".to_string())
        .spawn(move || {
            let conn = match open(&cfg) {
                Ok(conn) => {
                    let _ = ready_tx.send(Ok(()));
                    conn
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ResourceError::from(e)));
                    return;
                }
            };
            run(conn, queue, &cfg, &released);
        })
        .map_err(|e| ResourceError::msg(format!("failed to spawn store worker: {e}")))?;

    ready_rx
        .await
        .map_err(|_| ResourceError::msg("store worker exited while opening"))??;
    Ok(commands)
}

/// Wraps `op` into a job that replies with its result, or with the panic it raised.
///
/// A job whose caller is already gone is skipped.
pub(super) fn job<F, A>(span: Span, op: F, reply: oneshot::Sender<Result<A, ResourceError>>) -> Job
where
    F: FnOnce(&Connection) -> rusqlite::Result<A> + Send + 'static,
    A: Send + 'static,
{
    Box::new(move |conn: &Connection| {
        if reply.is_closed() {
            return;
        }
        let _enter = span.enter();
        let res = match std::panic::catch_unwind(AssertUnwindSafe(|| op(conn))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "store operation failed");
                Err(ResourceError::from(e))
            }
            Err(panic) => Err(ResourceError::msg(format!(
                "store operation panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        let _ = reply.send(res);
    })
}

fn open(cfg: &StoreConfig) -> rusqlite::Result<Connection> {
    let conn = match &cfg.location {
        StoreLocation::Memory => Connection::open_in_memory()?,
        StoreLocation::File(path) => Connection::open(path)?,
    };
    conn.busy_timeout(cfg.busy_timeout)?;
    Ok(conn)
}

fn run(
    conn: Connection,
    mut queue: mpsc::UnboundedReceiver<Command>,
    cfg: &StoreConfig,
    released: &AtomicBool,
) {
    let closers = {
        let mut worker = Worker {
            conn: &conn,
            queue: &mut queue,
            closers: Vec::new(),
        };
        worker.serve();
        worker.closers
    };

    let res = release(conn, cfg);
    released.store(true, Ordering::Release);

    // only the first close reports the release result
    let mut closers = closers.into_iter();
    if let Some(first) = closers.next() {
        let _ = first.send(res);
    }
    for other in closers {
        let _ = other.send(Ok(()));
    }

    queue.close();
    while let Ok(cmd) = queue.try_recv() {
        match cmd {
            Command::Stream(req) => {
                let _ = req.rows.try_send(Err(closed()));
            }
            Command::Close(reply) => {
                let _ = reply.send(Ok(()));
            }
            // dropping the job drops its reply channel
            Command::Call(_) => {}
        }
    }
}

fn release(conn: Connection, cfg: &StoreConfig) -> Result<(), ResourceError> {
    match conn.close() {
        Ok(()) => {
            tracing::debug!(location = ?cfg.location, "store released");
            Ok(())
        }
        Err((_conn, e)) => {
            tracing::error!(location = ?cfg.location, error = %e, "store release failed");
            Err(e.into())
        }
    }
}

enum Wake {
    Ready,
    Gone,
    Command(Command),
}

struct Worker<'c> {
    conn: &'c Connection,
    queue: &'c mut mpsc::UnboundedReceiver<Command>,
    closers: Vec<oneshot::Sender<Result<(), ResourceError>>>,
}

impl Worker<'_> {
    fn serve(&mut self) {
        while self.closers.is_empty() {
            match self.queue.blocking_recv() {
                Some(cmd) => self.handle(cmd),
                None => break,
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Call(job) => job(self.conn),
            Command::Stream(req) => self.stream(req),
            Command::Close(reply) => self.closers.push(reply),
        }
    }

    fn stream(&mut self, req: StreamRequest) {
        let StreamRequest {
            sql,
            params,
            span,
            rows,
        } = req;
        if rows.is_closed() {
            return;
        }
        let _enter = span.enter();
        match self.produce(&sql, &params, &rows) {
            Ok(n) => tracing::debug!(rows = n, "stream finished"),
            Err(e) => {
                tracing::debug!(error = %e, "stream failed");
                let _ = rows.try_send(Err(e));
            }
        }
    }

    /// Steps the cursor until it is exhausted, the consumer goes away or the store
    /// is closing.
    fn produce(
        &mut self,
        sql: &str,
        params: &[Value],
        rows: &mpsc::Sender<Item>,
    ) -> Result<usize, ResourceError> {
        let conn = self.conn;
        let mut stmt = conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        let mut sent = 0;
        while let Some(row) = cursor.next()? {
            let row = Row::read(&columns, row)?;
            if !self.deliver(rows, row) {
                tracing::debug!(rows = sent, "stream stopped early");
                break;
            }
            sent += 1;
        }
        Ok(sent)
    }

    /// Hands `row` to the consumer, serving queued commands while it is not ready.
    ///
    /// One slot of the channel is kept free for the terminal error item, so a row
    /// is only sent while at least two are free. Returns `false` once the consumer
    /// is gone or the store is closing.
    fn deliver(&mut self, rows: &mpsc::Sender<Item>, row: Row) -> bool {
        loop {
            if !self.closers.is_empty() {
                let _ = rows.try_send(Err(closed()));
                return false;
            }
            if rows.is_closed() {
                return false;
            }
            if rows.capacity() > 1 {
                return rows.try_send(Ok(row)).is_ok();
            }
            match self.wait(rows) {
                Wake::Ready => {}
                Wake::Gone => return false,
                Wake::Command(cmd) => self.handle(cmd),
            }
        }
    }

    /// Parks until the consumer has room for a row or another command arrives.
    fn wait(&mut self, rows: &mpsc::Sender<Item>) -> Wake {
        let queue = &mut *self.queue;
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                permits = rows.reserve_many(2) => match permits {
                    Ok(_) => Wake::Ready,
                    Err(_) => Wake::Gone,
                },
                cmd = queue.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    // every handle is gone; only this consumer is left
                    None => match rows.reserve_many(2).await {
                        Ok(_) => Wake::Ready,
                        Err(_) => Wake::Gone,
                    },
                },
            }
        })
    }
}
