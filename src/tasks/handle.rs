//! # Task identity, terminal outcome and handles.
//!
//! A spawned task is observed through two handles:
//! - [`TaskHandle`]: owned by whoever spawned the task; delivers the [`Outcome`]
//!   exactly once via [`TaskHandle::join`].
//! - [`TaskCanceller`]: cheap, cloneable reference that can only interrupt the task
//!   and observe that it finished. The request adapter keeps one of these for the
//!   client-disconnect listener.
//!
//! ## Rules
//! - The outcome is produced once by the runner and sent through a oneshot channel.
//! - If the task was aborted after the shutdown grace period, `join` resolves
//!   [`Outcome::Cancelled`].
//! - `cancel()` is idempotent; cancelling a finished task has no effect.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Terminal outcome of a supervised task.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The task body returned a value.
    Completed(T),
    /// The task body returned a non-cancellation error or panicked.
    Failed(TaskError),
    /// The task observed cancellation.
    Cancelled,
}

impl<T> Outcome<T> {
    /// True for [`Outcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// True for [`Outcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// True for [`Outcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Borrow the failure, if any.
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Converts into a `Result`, mapping cancellation to [`TaskError::Canceled`].
    ///
    /// Lets a parent propagate a child's cancellation with `?`.
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Outcome::Completed(v) => Ok(v),
            Outcome::Failed(e) => Err(e),
            Outcome::Cancelled => Err(TaskError::Canceled),
        }
    }

    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Owned handle to one in-flight task.
pub struct TaskHandle<T> {
    id: TaskId,
    name: Arc<str>,
    canceller: TaskCanceller,
    outcome: oneshot::Receiver<Outcome<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        id: TaskId,
        name: Arc<str>,
        canceller: TaskCanceller,
        outcome: oneshot::Receiver<Outcome<T>>,
    ) -> Self {
        Self {
            id,
            name,
            canceller,
            outcome,
        }
    }

    /// Identity of the task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name the task was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raises cancellation on the task (and, transitively, its children).
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// True once the task reached a terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.canceller.is_finished()
    }

    /// Returns a cloneable canceller for this task.
    pub fn canceller(&self) -> TaskCanceller {
        self.canceller.clone()
    }

    /// Waits for the terminal outcome.
    pub async fn join(self) -> Outcome<T> {
        self.outcome.await.unwrap_or(Outcome::Cancelled)
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Transient, cloneable reference used to interrupt a task.
#[derive(Clone, Debug)]
pub struct TaskCanceller {
    cancel: CancellationToken,
    done: CancellationToken,
}

impl TaskCanceller {
    pub(crate) fn new(cancel: CancellationToken, done: CancellationToken) -> Self {
        Self { cancel, done }
    }

    /// Raises cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once cancellation has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the task reached a terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Resolves when the task reached a terminal outcome.
    pub async fn finished(&self) {
        self.done.cancelled().await;
    }

    /// Raises cancellation after `after` unless the task finished first.
    ///
    /// Timeouts are layered on cancellation this way; the timer itself stops
    /// as soon as the task finishes.
    pub fn cancel_after(&self, after: Duration) {
        let me = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => me.cancel(),
                _ = me.finished() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("task-{}", a.as_u64()));
    }

    #[test]
    fn cancelled_outcome_converts_to_canceled_error() {
        let out: Outcome<()> = Outcome::Cancelled;
        assert!(out.is_cancelled());
        assert!(matches!(out.into_result(), Err(TaskError::Canceled)));
    }

    #[test]
    fn labels() {
        assert_eq!(Outcome::Completed(1).as_label(), "completed");
        assert_eq!(Outcome::<()>::Failed(TaskError::fail("x")).as_label(), "failed");
        assert_eq!(Outcome::<()>::Cancelled.as_label(), "cancelled");
    }

    #[tokio::test]
    async fn join_on_dropped_sender_is_cancelled() {
        let (tx, rx) = oneshot::channel::<Outcome<u8>>();
        let handle = TaskHandle::new(
            TaskId::next(),
            Arc::from("orphan"),
            TaskCanceller::new(CancellationToken::new(), CancellationToken::new()),
            rx,
        );
        drop(tx);
        assert!(handle.join().await.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_raises_cancellation() {
        let canceller = TaskCanceller::new(CancellationToken::new(), CancellationToken::new());
        canceller.cancel_after(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(canceller.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_is_disarmed_by_completion() {
        let done = CancellationToken::new();
        let canceller = TaskCanceller::new(CancellationToken::new(), done.clone());
        canceller.cancel_after(Duration::from_millis(50));
        done.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!canceller.is_cancelled());
    }
}
