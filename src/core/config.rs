//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`] centralized settings for the supervising scope.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore created)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `grace`: Maximum wait for tasks to reach a terminal outcome on shutdown
/// - `max_concurrent`: Limit of concurrently running task bodies (`0` = unlimited)
/// - `bus_capacity`: Event bus ring buffer size (min 1)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Maximum time to wait for graceful shutdown before aborting stuck tasks.
    ///
    /// On shutdown every registered task is cancelled; tasks observe this at their
    /// next suspension point. Tasks still running after `grace` are aborted and
    /// reported through `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Maximum number of task bodies running at once.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` tasks past admission; others wait (cancellably)
    pub max_concurrent: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Returns the global concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `max_concurrent = 0` (unlimited)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            max_concurrent: 0,
            bus_capacity: 1024,
        }
    }
}
