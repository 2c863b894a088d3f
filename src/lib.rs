//! # reqvisor
//!
//! **Reqvisor** turns callback-driven request handling into supervised, cancellable
//! async tasks, and pairs it with a scoped, error-normalizing handle to an embedded
//! SQLite store.
//!
//! Every inbound request becomes one task under a supervising scope. The task is
//! cancelled when the client disconnects or the scope shuts down, and its response
//! is finalized exactly once, whatever the outcome. Failures are classified so that
//! expected cancellations never reach the warning log.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   server callback           server callback           server callback
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  RequestAdapter::on_request(Inbound)                              │
//! │  - RequestContext (head, response, state, finalized flag)         │
//! │  - completion hook (exactly-once finalize, warning on failure)    │
//! │  - disconnect listener (ClosedSignal → cancel task)               │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (supervising scope)                                   │
//! │  - Registry (arena of running tasks keyed by TaskId)              │
//! │  - runtime token (parent of every task token)                     │
//! │  - Bus (broadcast events) ─► listener ─► SubscriberSet            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   run_once   │   │   run_once   │   │   run_once   │
//!     │ (route task) │   │ (route task) │   │ (route task) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │                  │                  │ ctx.spawn(child)
//!            └──────────────────┼──────────────────┘
//!                               ▼
//!                 ┌────────────────────────────┐
//!                 │ Store (one connection)     │
//!                 │ use / query / stream       │
//!                 │ every fault → ResourceError│
//!                 └────────────────────────────┘
//! ```
//!
//! ### Request lifecycle
//! ```text
//! Spawned ──► Running ──► route.call(state, req, ctx)
//!                               │
//!        ┌──────────────────────┼───────────────────────┐
//!        ▼                      ▼                       ▼
//!    Ok(())               Err(non-cancel)       cancelled / Err(Canceled)
//!  Completed                 Failed                  Cancelled
//!  204 if unsent           500 if unsent           no status
//!        └──────────────┬───────┴───────────────────────┘
//!                       ▼
//!        end stream if not ended, finalized = true (once)
//!        Failed only: warn!(method, path, headers) + RequestFailed
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Spawn, cancel, list and shut down tasks in one scope.              | [`Supervisor`], [`TaskHandle`], [`Outcome`] |
//! | **Tasks**         | Define tasks as functions or types; structured children.           | [`Task`], [`TaskFn`], [`TaskContext`]       |
//! | **Requests**      | Adapt server callbacks into supervised route tasks.                | [`RequestAdapter`], [`Route`], [`ResponseSink`] |
//! | **Store**         | Scoped SQLite handle with eager and streaming queries.             | [`Store`], [`Row`], [`RowStream`]           |
//! | **Errors**        | One typed shape per boundary.                                      | [`ResourceError`], [`TaskError`], [`RuntimeError`] |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers).   | [`Subscribe`], [`LogWriter`]                |
//! | **Configuration** | Centralize runtime and store settings.                             | [`SupervisorConfig`], [`StoreConfig`]       |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use reqvisor::{
//!     Inbound, LogWriter, MemorySink, RequestAdapter, RequestContext, RequestHead, Store,
//!     StoreConfig, Supervisor, SupervisorConfig, TaskContext, TaskError, Value,
//! };
//!
//! async fn count_users(store: Arc<Store>, req: RequestContext, ctx: TaskContext) -> Result<(), TaskError> {
//!     let rows = store.query("SELECT COUNT(*) AS n FROM users", vec![]).await?;
//!     ctx.checkpoint()?;
//!     let n: i64 = rows[0].get("n")?;
//!     req.response().write_status(200).await.map_err(TaskError::fail)?;
//!     req.response().write_body(n.to_string().as_bytes()).await.map_err(TaskError::fail)?;
//!     Ok(())
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open(StoreConfig::in_memory()).await?;
//!     store.query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", vec![]).await?;
//!     store.query("INSERT INTO users (name) VALUES (?1)", vec![Value::Text("ada".into())]).await?;
//!
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_subscriber(Arc::new(LogWriter::new()))
//!         .build();
//!     let adapter = RequestAdapter::new(Arc::clone(&sup), Arc::new(store.clone()), count_users);
//!
//!     let sink = MemorySink::new();
//!     let handle = adapter
//!         .on_request(Inbound::new(RequestHead::new("GET", "/users/count"), sink.clone()))
//!         .await;
//!     assert!(handle.join().await.is_completed());
//!     assert_eq!(sink.record().body, b"1");
//!
//!     sup.shutdown().await?;
//!     store.close().await?;
//!     Ok(())
//! }
//! ```
mod adapter;
mod core;
mod error;
mod events;
mod store;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use adapter::{
    ClosedSignal, Inbound, MemorySink, RequestAdapter, RequestContext, RequestHandle, RequestHead,
    RequestState, ResponseHandle, ResponseRecord, ResponseSink, Route,
};
pub use crate::core::{Supervisor, SupervisorBuilder, SupervisorConfig, TaskInfo};
pub use error::{BoxError, ErrorKind, ResourceError, RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use store::{Row, RowStream, Store, StoreConfig, StoreLocation, Value};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{BoxTaskFuture, Outcome, Task, TaskCanceller, TaskContext, TaskFn, TaskHandle, TaskId};
