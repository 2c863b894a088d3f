//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: FnOnce(TaskContext) -> Fut`, so ad-hoc work can be
//! supervised without a dedicated type.
//!
//! ## Example
//! ```rust
//! use reqvisor::{TaskContext, TaskError, TaskFn};
//!
//! let t = TaskFn::new("worker", |ctx: TaskContext| async move {
//!     ctx.checkpoint()?;
//!     Ok::<_, TaskError>(42)
//! });
//! ```

use std::borrow::Cow;
use std::future::Future;

use crate::error::TaskError;
use crate::tasks::task::{BoxTaskFuture, Task};
use crate::tasks::TaskContext;

/// Function-backed task implementation.
#[derive(Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a new function-backed task.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F, Fut, T> Task for TaskFn<F>
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(self, ctx: TaskContext) -> BoxTaskFuture<T> {
        Box::pin((self.f)(ctx))
    }
}
