//! Error types used by the supervisor, the store and request tasks.
//!
//! This module defines the failure taxonomy that crosses component boundaries:
//!
//! - [`ResourceError`]: any fault raised while operating the shared store, with the
//!   original cause kept opaque.
//! - [`TaskError`]: the terminal failure of a task, such as a resource fault, a task-level
//!   failure, a caught panic, or cancellation.
//! - [`RuntimeError`]: errors raised by the supervisor itself.
//!
//! All of them expose `as_label` for logs/metrics. [`ErrorKind`] is the shared
//! discriminator, so call sites can match on one shape regardless of origin.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed, thread-safe error used as the opaque cause of a [`ResourceError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Discriminator shared by every error crossing a component boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fault while operating the shared store.
    Resource,
    /// Route-level failure not caused by cancellation.
    Task,
    /// Cooperative cancellation (client disconnect, shutdown, explicit cancel).
    Cancellation,
}

impl ErrorKind {
    /// Returns the name of the kind as it appears in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Resource => "ResourceError",
            ErrorKind::Task => "TaskFailure",
            ErrorKind::Cancellation => "Cancellation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Fault raised while operating the store.
///
/// Every store operation funnels native failures (malformed statement, constraint
/// violation, I/O, closed connection, panicking operation) through
/// [`ResourceError::new`]; nothing untyped crosses the store boundary.
///
/// # Example
/// ```
/// use reqvisor::{ErrorKind, ResourceError};
///
/// let err = ResourceError::msg("disk full");
/// assert_eq!(err.kind(), ErrorKind::Resource);
/// assert_eq!(err.to_string(), "resource error: disk full");
/// ```
#[derive(Error, Debug)]
#[error("resource error: {cause}")]
pub struct ResourceError {
    #[source]
    cause: BoxError,
}

impl ResourceError {
    /// Wraps any failure as a resource error. This is the only normalizer.
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    /// Wraps a plain message (closed store, worker gone).
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    /// Always [`ErrorKind::Resource`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Resource
    }

    /// Borrow the original failure.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    /// Attempts to view the cause as a concrete error type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }

    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "resource_error"
    }
}

impl From<rusqlite::Error> for ResourceError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(e)
    }
}

impl From<rusqlite::types::FromSqlError> for ResourceError {
    fn from(e: rusqlite::types::FromSqlError) -> Self {
        Self::new(e)
    }
}

/// # Errors produced by task execution.
///
/// A task resolves with one of these when it does not complete. Cancellation is a
/// variant here so route code can propagate it with `?`, but the runner turns it into
/// [`Outcome::Cancelled`](crate::Outcome::Cancelled), never into a failure outcome.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Store fault that the route logic did not recover from.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Route-level failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The task body panicked; the panic was caught by the runner.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// Task was cancelled (disconnect, shutdown or explicit cancel).
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns the shared discriminator for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Resource(_) => ErrorKind::Resource,
            TaskError::Fail { .. } | TaskError::Panicked { .. } => ErrorKind::Task,
            TaskError::Canceled => ErrorKind::Cancellation,
        }
    }

    /// True when the failure exists only because the task was cancelled.
    ///
    /// Such failures are never logged as warnings.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancellation)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use reqvisor::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Resource(_) => "task_resource_error",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Canceled => "task_canceled",
        }
    }
}

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; the listed tasks were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of tasks that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
