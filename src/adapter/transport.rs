//! # Transport boundary consumed by the request adapter.
//!
//! The adapter never depends on a particular HTTP server. A server integration hands
//! it an [`Inbound`] per request:
//! - [`RequestHead`]: method, path and headers (read-only);
//! - a [`ResponseSink`]: write a status, write body bytes, end the stream;
//! - a [`ClosedSignal`]: resolves when the connection closed early.
//!
//! [`MemorySink`] is an in-process sink that records everything written to it.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

/// Method, path and headers of an inbound request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method (`GET`, `POST`, ...).
    pub method: String,
    /// Request path, without scheme or host.
    pub path: String,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Creates a head without headers.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// # Outward response channel of one request.
///
/// Implemented by server integrations. Writing body bytes implies the status line
/// went out, so after `write_body` an implementation reports `status_sent() == true`.
#[async_trait]
pub trait ResponseSink: Send + 'static {
    /// True once a status (or any body byte) has been sent.
    fn status_sent(&self) -> bool;

    /// True once the response stream has been ended.
    fn is_ended(&self) -> bool;

    /// Sends the status line.
    async fn write_status(&mut self, status: u16) -> io::Result<()>;

    /// Sends body bytes.
    async fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Ends the response stream.
    async fn end(&mut self) -> io::Result<()>;
}

/// Shared, serialized access to a request's [`ResponseSink`].
///
/// Route logic and the completion hook write through the same handle; the lock
/// makes "check then write" steps atomic with respect to each other.
#[derive(Clone)]
pub struct ResponseHandle {
    sink: Arc<AsyncMutex<Box<dyn ResponseSink>>>,
}

impl ResponseHandle {
    pub(crate) fn new(sink: Box<dyn ResponseSink>) -> Self {
        Self {
            sink: Arc::new(AsyncMutex::new(sink)),
        }
    }

    /// Sends the status line.
    ///
    /// # Errors
    /// Fails if a status was already sent, the response has ended, or the sink fails.
    pub async fn write_status(&self, status: u16) -> io::Result<()> {
        let mut sink = self.sink.lock().await;
        if sink.is_ended() {
            return Err(io::Error::other("response already ended"));
        }
        if sink.status_sent() {
            return Err(io::Error::other("status already sent"));
        }
        sink.write_status(status).await
    }

    /// Sends body bytes.
    ///
    /// # Errors
    /// Fails if the response has ended or the sink fails.
    pub async fn write_body(&self, bytes: &[u8]) -> io::Result<()> {
        let mut sink = self.sink.lock().await;
        if sink.is_ended() {
            return Err(io::Error::other("response already ended"));
        }
        sink.write_body(bytes).await
    }

    /// Ends the response stream. Ending twice is a no-op.
    pub async fn end(&self) -> io::Result<()> {
        let mut sink = self.sink.lock().await;
        if sink.is_ended() {
            return Ok(());
        }
        sink.end().await
    }

    /// True once a status has been sent.
    pub async fn status_sent(&self) -> bool {
        self.sink.lock().await.status_sent()
    }

    /// True once the stream has been ended.
    pub async fn is_ended(&self) -> bool {
        self.sink.lock().await.is_ended()
    }

    /// Writes `status` unless one was already sent, then ends the stream unless it
    /// already ended. Returns the status this call wrote.
    pub(crate) async fn finish(&self, status: Option<u16>) -> Option<u16> {
        let mut sink = self.sink.lock().await;
        let mut written = None;
        if let Some(code) = status {
            if !sink.status_sent() && !sink.is_ended() {
                match sink.write_status(code).await {
                    Ok(()) => written = Some(code),
                    Err(e) => tracing::debug!(status = code, error = %e, "status write failed"),
                }
            }
        }
        if !sink.is_ended() {
            if let Err(e) = sink.end().await {
                tracing::debug!(error = %e, "response end failed");
            }
        }
        written
    }
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle").finish_non_exhaustive()
    }
}

/// Resolves when the transport reports that the connection closed early.
pub struct ClosedSignal {
    fut: BoxFuture<'static, ()>,
}

impl ClosedSignal {
    /// Wraps any future that resolves on early close.
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { fut: fut.boxed() }
    }

    /// Resolves when `token` is cancelled.
    pub fn from_token(token: CancellationToken) -> Self {
        Self::from_future(async move { token.cancelled().await })
    }

    /// Never resolves (transport without early-close detection).
    pub fn never() -> Self {
        Self::from_future(future::pending())
    }
}

impl Future for ClosedSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.fut.poll_unpin(cx)
    }
}

impl fmt::Debug for ClosedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedSignal").finish_non_exhaustive()
    }
}

/// Everything the adapter receives for one request.
pub struct Inbound {
    /// Method, path, headers.
    pub head: RequestHead,
    /// Response channel.
    pub response: Box<dyn ResponseSink>,
    /// Early-close signal.
    pub closed: ClosedSignal,
}

impl Inbound {
    /// Creates an inbound request whose transport never reports an early close.
    pub fn new(head: RequestHead, response: impl ResponseSink) -> Self {
        Self {
            head,
            response: Box::new(response),
            closed: ClosedSignal::never(),
        }
    }

    /// Sets the early-close signal.
    pub fn with_closed(mut self, closed: ClosedSignal) -> Self {
        self.closed = closed;
        self
    }
}

/// What a [`MemorySink`] has recorded so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseRecord {
    /// Every status written, in order.
    pub statuses: Vec<u16>,
    /// Body bytes written.
    pub body: Vec<u8>,
    /// Number of `end` calls that reached the sink.
    pub ends: usize,
}

impl ResponseRecord {
    /// Last status written, if any.
    pub fn status(&self) -> Option<u16> {
        self.statuses.last().copied()
    }
}

/// In-process [`ResponseSink`] that records every write.
///
/// Clones share the same record, so one clone can be handed to the adapter and
/// another kept to inspect the response.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    record: Arc<Mutex<ResponseRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record.
    pub fn record(&self) -> ResponseRecord {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResponseRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    fn status_sent(&self) -> bool {
        let r = self.lock();
        !r.statuses.is_empty() || !r.body.is_empty()
    }

    fn is_ended(&self) -> bool {
        self.lock().ends > 0
    }

    async fn write_status(&mut self, status: u16) -> io::Result<()> {
        self.lock().statuses.push(status);
        Ok(())
    }

    async fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.lock().body.extend_from_slice(bytes);
        Ok(())
    }

    async fn end(&mut self) -> io::Result<()> {
        self.lock().ends += 1;
        Ok(())
    }
}
