//! # Task abstraction.
//!
//! A [`Task`] is a one-shot unit of concurrent work. It has a human-readable
//! [`name`](Task::name) and is consumed by [`spawn`](Task::spawn), which receives a
//! [`TaskContext`] and returns the boxed future the supervisor drives.
//!
//! Implementors should await cancellation-aware points
//! ([`TaskContext::checkpoint`], [`TaskContext::until_cancelled`]) between units of
//! work; the runner additionally stops polling the body once cancellation is raised.

use std::future::Future;
use std::pin::Pin;

use crate::error::TaskError;
use crate::tasks::TaskContext;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send + 'static>>;

/// # Asynchronous, cancelable, one-shot unit of work.
///
/// # Example
/// ```
/// use reqvisor::{BoxTaskFuture, Task, TaskContext, TaskError};
///
/// struct Count(u32);
///
/// impl Task for Count {
///     type Output = u32;
///
///     fn name(&self) -> &str { "count" }
///
///     fn spawn(self, ctx: TaskContext) -> BoxTaskFuture<u32> {
///         Box::pin(async move {
///             ctx.checkpoint()?;
///             Ok::<_, TaskError>(self.0 + 1)
///         })
///     }
/// }
/// ```
pub trait Task: Send + 'static {
    /// Value produced on completion.
    type Output: Send + 'static;

    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates the future that performs the work.
    fn spawn(self, ctx: TaskContext) -> BoxTaskFuture<Self::Output>;
}
