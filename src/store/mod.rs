//! # Store: scoped handle to the embedded database.
//!
//! A [`Store`] owns exactly one live SQLite connection and shares it, read/write,
//! across every task holding a clone. The connection lives on a dedicated worker
//! thread; every operation is a command on that thread's queue, so callers never
//! lock anything and operations run one at a time in the order issued.
//!
//! Each operation funnels native failures through [`ResourceError`]; nothing
//! untyped crosses this boundary, including panics raised inside a
//! [`Store::with_connection`] closure.
//!
//! ## Operations
//! ```text
//! open(config) ──► Store ──┬── with_connection(op)  span "store.use"
//!                          ├── query(sql, params)    span "store.query"  → Vec<Row>
//!                          ├── stream(sql, params)   span "store.stream" → RowStream (lazy)
//!                          └── close()               exactly once (also when the last clone drops)
//! ```
//!
//! Once started, an operation runs to completion; task cancellation is observed
//! between operations. An operation whose caller went away before it started is
//! skipped.
//!
//! ## Example
//! ```rust
//! use reqvisor::{ResourceError, Store, StoreConfig, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), ResourceError> {
//!     Store::scoped(StoreConfig::in_memory(), |store| async move {
//!         store.query("CREATE TABLE t (x INTEGER)", vec![]).await?;
//!         store.query("INSERT INTO t VALUES (?1)", vec![Value::Integer(1)]).await?;
//!         let rows = store.query("SELECT x FROM t", vec![]).await?;
//!         assert_eq!(rows[0].get::<i64>("x")?, 1);
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

mod config;
mod row;
mod stream;
mod worker;

pub use config::{StoreConfig, StoreLocation};
pub use row::Row;
pub use rusqlite::types::Value;
pub use stream::RowStream;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use rusqlite::{Connection, Statement, params_from_iter};
use tokio::sync::{mpsc, oneshot};
use tracing::Span;

use crate::error::ResourceError;
use worker::Command;

struct StoreInner {
    commands: mpsc::UnboundedSender<Command>,
    released: Arc<AtomicBool>,
    config: StoreConfig,
}

impl StoreInner {
    /// Enqueues `cmd` for the worker. Fails once the connection was released.
    fn send(&self, cmd: Command) -> Result<(), ResourceError> {
        self.commands.send(cmd).map_err(|_| closed())
    }
}

/// Shared handle to one embedded database connection.
///
/// Cloning is cheap; all clones use the same connection. The connection is
/// released by [`Store::close`], or when the last clone (and the last live
/// [`RowStream`]) is dropped.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Acquires the connection described by `config`.
    ///
    /// # Errors
    /// [`ResourceError`] if the database cannot be opened or configured.
    pub async fn open(config: StoreConfig) -> Result<Self, ResourceError> {
        let released = Arc::new(AtomicBool::new(false));
        let commands = worker::spawn(&config, Arc::clone(&released)).await?;

        tracing::debug!(location = ?config.location, "store opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                commands,
                released,
                config,
            }),
        })
    }

    /// Opens a store, hands it to `f` and releases it on every exit path.
    ///
    /// The error of `f` wins over a release error; a release error alone is
    /// returned when `f` succeeded. A panic in `f` is resumed after release.
    pub async fn scoped<F, Fut, T, E>(config: StoreConfig, f: F) -> Result<T, E>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResourceError>,
    {
        let store = Store::open(config).await?;
        let res = AssertUnwindSafe(f(store.clone())).catch_unwind().await;
        let released = store.close().await;
        match res {
            Ok(out) => {
                let value = out?;
                released?;
                Ok(value)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// True once the connection has been released.
    pub fn is_closed(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Runs `op` against the live connection.
    ///
    /// Use [`Connection::unchecked_transaction`] for multi-statement transactions.
    ///
    /// # Errors
    /// [`ResourceError`] wrapping the failure of `op`, a panic raised by `op`, or
    /// the store being closed.
    pub async fn with_connection<F, A>(&self, op: F) -> Result<A, ResourceError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<A> + Send + 'static,
        A: Send + 'static,
    {
        self.call(tracing::debug_span!("store.use"), op).await
    }

    /// Executes one statement.
    ///
    /// Row-producing statements return their rows collected in result order; other
    /// statements (DDL, mutations) return an empty vector.
    ///
    /// # Errors
    /// [`ResourceError`] on malformed SQL, constraint violations, I/O faults or a
    /// closed store. Nothing is retried.
    pub async fn query(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, ResourceError> {
        let sql = sql.into();
        let span = tracing::debug_span!("store.query", sql = sql.as_str());
        self.call(span, move |conn| collect_rows(conn, &sql, &params))
            .await
    }

    /// Executes one statement and yields its rows lazily.
    ///
    /// Nothing runs until the stream is first polled. Failures surface as an
    /// `Err` item, after which the stream ends. Dropping the stream stops
    /// production early.
    ///
    /// A paused stream does not hold up other operations on the store.
    pub fn stream(&self, sql: impl Into<String>, params: Vec<Value>) -> RowStream {
        let sql = sql.into();
        let span = tracing::debug_span!("store.stream", sql = sql.as_str());
        RowStream::new(Arc::clone(&self.inner), sql, params, span)
    }

    /// Releases the connection.
    ///
    /// Only the first call releases; later calls return `Ok(())`. A release
    /// failure is logged at `error` level and returned.
    pub async fn close(&self) -> Result<(), ResourceError> {
        let (reply, done) = oneshot::channel();
        if self.inner.send(Command::Close(reply)).is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }

    async fn call<F, A>(&self, span: Span, op: F) -> Result<A, ResourceError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<A> + Send + 'static,
        A: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.inner
            .send(Command::Call(worker::job(span, op, reply)))?;
        result.await.map_err(|_| closed())?
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("location", &self.inner.config.location)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn collect_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        stmt.execute(params_from_iter(params.iter()))?;
        return Ok(Vec::new());
    }
    let columns = column_names(&stmt);
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(Row::read(&columns, row)?);
    }
    Ok(out)
}

fn column_names(stmt: &Statement<'_>) -> Arc<[String]> {
    stmt.column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>()
        .into()
}

fn closed() -> ResourceError {
    ResourceError::msg("store closed")
}
