//! # Task abstractions and handles.
//!
//! This module provides the core task-related types:
//! - [`Task`] - trait for implementing async cancelable one-shot tasks
//! - [`TaskFn`] - function-backed task implementation
//! - [`TaskContext`] - identity, cancellation and child spawning for a running task
//! - [`TaskHandle`], [`TaskCanceller`] - owner and interrupt handles
//! - [`Outcome`] - terminal result delivered exactly once

mod context;
mod handle;
mod task;
mod task_fn;

pub use context::TaskContext;
pub use handle::{Outcome, TaskCanceller, TaskHandle, TaskId};
pub use task::{BoxTaskFuture, Task};
pub use task_fn::TaskFn;
