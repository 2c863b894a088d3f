//! # Runtime events emitted by the supervisor, task runner and request adapter.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Task lifecycle**: starting, completed, failed, cancelled
//! - **Request lifecycle**: client disconnect, response finalized, request failed
//! - **Shutdown**: requested, all stopped within grace, grace exceeded
//! - **Subscriber health**: overflow, panic
//!
//! The [`Event`] struct carries optional metadata (task id/name, reason, HTTP method,
//! path, status code) depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use reqvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RequestFailed)
//!     .with_request("POST", "/users")
//!     .with_reason("execution failed: boom");
//!
//! assert_eq!(ev.kind, EventKind::RequestFailed);
//! assert_eq!(ev.method.as_deref(), Some("POST"));
//! assert_eq!(ev.path.as_deref(), Some("/users"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::tasks::TaskId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown of the supervising scope started.
    ShutdownRequested,

    /// All registered tasks reached a terminal outcome within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; remaining tasks were aborted.
    ///
    /// Sets:
    /// - `reason`: stuck task names
    GraceExceeded,

    // === Task lifecycle events ===
    /// Task passed admission and its body is about to be polled.
    ///
    /// Sets:
    /// - `task`, `task_id`
    TaskStarting,

    /// Task body returned a value.
    ///
    /// Sets:
    /// - `task`, `task_id`
    TaskCompleted,

    /// Task body returned a non-cancellation error or panicked.
    ///
    /// Sets:
    /// - `task`, `task_id`
    /// - `reason`: failure message
    TaskFailed,

    /// Task observed cancellation (before start, at a suspension point, or by
    /// returning [`TaskError::Canceled`](crate::TaskError::Canceled)).
    ///
    /// Sets:
    /// - `task`, `task_id`
    TaskCancelled,

    // === Request lifecycle events ===
    /// The transport reported that the client went away before the task finished.
    ///
    /// Sets:
    /// - `task_id`, `method`, `path`
    ClientDisconnected,

    /// The response was finalized (exactly once per request).
    ///
    /// Sets:
    /// - `task_id`, `method`, `path`
    /// - `status`: status written by the completion hook, if any
    RequestFinalized,

    /// A request task failed for a reason other than cancellation.
    ///
    /// Published in the same branch that emits the warning log, so there is exactly
    /// one of these per warning.
    ///
    /// Sets:
    /// - `task_id`, `method`, `path`
    /// - `reason`: failure message
    RequestFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the task (or subscriber), if applicable.
    pub task: Option<Arc<str>>,
    /// Identity of the task, if applicable.
    pub task_id: Option<TaskId>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Request method.
    pub method: Option<Arc<str>>,
    /// Request path.
    pub path: Option<Arc<str>>,
    /// Status code written while finalizing a response.
    pub status: Option<u16>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            task_id: None,
            reason: None,
            method: None,
            path: None,
            status: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task identity.
    #[inline]
    pub fn with_task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches request method and path.
    #[inline]
    pub fn with_request(mut self, method: impl Into<Arc<str>>, path: impl Into<Arc<str>>) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self
    }

    /// Attaches the status code written during finalization.
    #[inline]
    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// True for terminal task events (`TaskCompleted`, `TaskFailed`, `TaskCancelled`).
    #[inline]
    pub fn is_task_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskCompleted | EventKind::TaskFailed | EventKind::TaskCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::TaskStarting);
        let b = Event::new(EventKind::TaskCompleted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn terminal_classification() {
        assert!(Event::new(EventKind::TaskCancelled).is_task_terminal());
        assert!(Event::new(EventKind::TaskFailed).is_task_terminal());
        assert!(!Event::new(EventKind::TaskStarting).is_task_terminal());
        assert!(!Event::new(EventKind::RequestFinalized).is_task_terminal());
    }

    #[test]
    fn overflow_event_names_subscriber() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.task.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
