//! # LogWriter: runtime events rendered through `tracing`
//!
//! A subscriber that turns incoming [`Event`]s into structured `tracing` records.
//! Task lifecycle goes to `debug`, request finalization and shutdown milestones to
//! `info`, subscriber trouble to `warn`.
//!
//! `RequestFailed` is not re-logged here: the request adapter already emits the
//! warning for it, and a second record per failure would double-count.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let id = e.task_id.map(|id| id.as_u64());
        match e.kind {
            EventKind::TaskStarting => {
                tracing::debug!(seq = e.seq, task, ?id, "task starting");
            }
            EventKind::TaskCompleted => {
                tracing::debug!(seq = e.seq, task, ?id, "task completed");
            }
            EventKind::TaskCancelled => {
                tracing::debug!(seq = e.seq, task, ?id, reason = ?e.reason, "task cancelled");
            }
            EventKind::TaskFailed => {
                tracing::debug!(seq = e.seq, task, ?id, reason = ?e.reason, "task failed");
            }
            EventKind::ClientDisconnected => {
                tracing::debug!(seq = e.seq, ?id, method = ?e.method, path = ?e.path, "client disconnected");
            }
            EventKind::RequestFinalized => {
                tracing::info!(
                    seq = e.seq,
                    method = e.method.as_deref().unwrap_or("-"),
                    path = e.path.as_deref().unwrap_or("-"),
                    status = ?e.status,
                    "request finalized"
                );
            }
            EventKind::RequestFailed => {}
            EventKind::ShutdownRequested => {
                tracing::info!(seq = e.seq, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!(seq = e.seq, "all tasks stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(seq = e.seq, stuck = ?e.reason, "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(seq = e.seq, subscriber = task, reason = ?e.reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(seq = e.seq, subscriber = task, info = ?e.reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
