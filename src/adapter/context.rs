//! # Per-request state shared by route logic and the completion hook.
//!
//! ```text
//! Spawned ──► Running ──► Completed | Failed | Cancelled
//!    └───────────────────────────────────────► Cancelled   (cancelled before start)
//!
//! finalized: false ──(exactly once)──► true
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::adapter::transport::{RequestHead, ResponseHandle, ResponseSink};
use crate::tasks::TaskId;

/// Lifecycle state of one request task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestState {
    /// Task registered, body not started.
    Spawned = 0,
    /// Route logic is running.
    Running = 1,
    /// Route logic returned `Ok`.
    Completed = 2,
    /// Route logic failed (not because of cancellation).
    Failed = 3,
    /// Task was cancelled (disconnect, shutdown, explicit cancel).
    Cancelled = 4,
}

impl RequestState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RequestState::Spawned,
            1 => RequestState::Running,
            2 => RequestState::Completed,
            3 => RequestState::Failed,
            _ => RequestState::Cancelled,
        }
    }

    /// True for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }
}

struct Inner {
    task_id: TaskId,
    head: RequestHead,
    response: ResponseHandle,
    state: AtomicU8,
    finalized: AtomicBool,
}

/// Request head, response channel, lifecycle state and the one-shot finalized flag.
///
/// Cheap to clone; all clones observe the same request.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    pub(crate) fn new(task_id: TaskId, head: RequestHead, response: Box<dyn ResponseSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                task_id,
                head,
                response: ResponseHandle::new(response),
                state: AtomicU8::new(RequestState::Spawned as u8),
                finalized: AtomicBool::new(false),
            }),
        }
    }

    /// Identity of the task serving this request.
    pub fn task_id(&self) -> TaskId {
        self.inner.task_id
    }

    /// Method, path and headers.
    pub fn head(&self) -> &RequestHead {
        &self.inner.head
    }

    /// Request method.
    pub fn method(&self) -> &str {
        &self.inner.head.method
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.inner.head.path
    }

    /// Response channel.
    pub fn response(&self) -> &ResponseHandle {
        &self.inner.response
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// True once the response has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.inner.finalized.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: RequestState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Moves `Spawned` to `Running`; a no-op in any other state.
    pub(crate) fn mark_running(&self) {
        let _ = self.inner.state.compare_exchange(
            RequestState::Spawned as u8,
            RequestState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Sets the finalized flag. Returns `true` only for the caller that flipped it.
    pub(crate) fn try_finalize(&self) -> bool {
        self.inner
            .finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("task_id", &self.task_id())
            .field("method", &self.method())
            .field("path", &self.path())
            .field("state", &self.state())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}
