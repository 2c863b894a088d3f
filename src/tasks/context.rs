//! # Per-task execution context.
//!
//! [`TaskContext`] is handed to every task body. It carries the task's identity,
//! its cancellation token and a reference to the supervising scope, so the body can:
//! - observe cancellation at its suspension points ([`checkpoint`](TaskContext::checkpoint),
//!   [`until_cancelled`](TaskContext::until_cancelled), [`cancelled`](TaskContext::cancelled));
//! - spawn structured children ([`spawn`](TaskContext::spawn)) whose tokens are
//!   derived from this task's token.
//!
//! ## Structured nesting
//! ```text
//! runtime_token
//!   └── request task token          (ctx)
//!         ├── child token           (ctx.spawn(..))
//!         │     └── grandchild
//!         └── child token
//! ```
//! Cancelling any node cancels its whole subtree. A node whose body returned
//! cancels what is left of its subtree and waits for it before reporting its own
//! outcome. Every node is registered in the same registry, so supervisor shutdown
//! awaits all of them.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::Registry;
use crate::error::TaskError;
use crate::tasks::{Task, TaskHandle, TaskId};

/// Execution context of one task.
#[derive(Clone)]
pub struct TaskContext {
    id: TaskId,
    name: Arc<str>,
    token: CancellationToken,
    registry: Arc<Registry>,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        name: Arc<str>,
        token: CancellationToken,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            id,
            name,
            token,
            registry,
        }
    }

    /// Identity of the running task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name of the running task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once cancellation has been raised on this task or an ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation is raised.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns `Err(TaskError::Canceled)` if cancellation has been raised.
    ///
    /// Call between units of work:
    /// ```ignore
    /// for chunk in chunks {
    ///     ctx.checkpoint()?;
    ///     write(chunk).await?;
    /// }
    /// ```
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        if self.token.is_cancelled() {
            Err(TaskError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Drives `fut` unless cancellation is raised first.
    ///
    /// Cancellation wins ties, and `fut` is dropped without being polled again.
    pub async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, TaskError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TaskError::Canceled),
            out = fut => Ok(out),
        }
    }

    /// Spawns a child task in the same supervising scope.
    ///
    /// The child's token is derived from this task's token: cancelling this task
    /// cancels the child. Children still running when this task's body returns are
    /// cancelled, and the task's outcome is delivered only after they finished.
    pub async fn spawn<T: Task>(&self, task: T) -> TaskHandle<T::Output> {
        self.registry
            .spawn(TaskId::next(), task, &self.token, Some(self.id), None)
            .await
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
