//! Supervising scope: registry, runner and lifecycle.
//!
//! The public API from this module is [`Supervisor`] (with its builder and config)
//! and the [`TaskInfo`] snapshot type.
//!
//! Internal modules:
//! - [`runner`]: drives one task to its terminal outcome and publishes events;
//! - [`registry`]: arena of running tasks keyed by id, scope closing;
//! - [`supervisor`]: spawning, cancellation, subscriber fan-out, graceful shutdown;
//! - [`shutdown`]: cross-platform termination signal handling.

mod builder;
mod config;
mod registry;
mod runner;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub(crate) use registry::Registry;
pub(crate) use runner::panic_message;
pub use registry::TaskInfo;
pub use supervisor::Supervisor;
