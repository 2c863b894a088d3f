//! # Request adapter: event-driven server callbacks → supervised tasks.
//!
//! A server integration converts each callback into an [`Inbound`] and calls
//! [`RequestAdapter::on_request`]. The adapter spawns one supervised task running
//! the [`Route`], cancels it when the client disconnects, and finalizes the
//! response exactly once whatever the outcome.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use reqvisor::{
//!     Inbound, MemorySink, RequestAdapter, RequestContext, RequestHead, Supervisor,
//!     SupervisorConfig, TaskContext, TaskError,
//! };
//!
//! async fn hello(_: Arc<()>, req: RequestContext, _: TaskContext) -> Result<(), TaskError> {
//!     req.response().write_status(200).await.map_err(TaskError::fail)?;
//!     req.response().write_body(b"hello").await.map_err(TaskError::fail)?;
//!     Ok(())
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let sup = Supervisor::builder(SupervisorConfig::default()).build();
//!     let adapter = RequestAdapter::new(Arc::clone(&sup), Arc::new(()), hello);
//!
//!     let sink = MemorySink::new();
//!     let handle = adapter
//!         .on_request(Inbound::new(RequestHead::new("GET", "/hello"), sink.clone()))
//!         .await;
//!     handle.join().await;
//!
//!     let rec = sink.record();
//!     assert_eq!(rec.statuses, [200]);
//!     assert_eq!(rec.body, b"hello");
//!     assert_eq!(rec.ends, 1);
//!     sup.shutdown().await.unwrap();
//! }
//! ```

mod context;
mod request;
mod route;
mod transport;

pub use context::{RequestContext, RequestState};
pub use request::{RequestAdapter, RequestHandle};
pub use route::Route;
pub use transport::{
    ClosedSignal, Inbound, MemorySink, RequestHead, ResponseHandle, ResponseRecord, ResponseSink,
};
