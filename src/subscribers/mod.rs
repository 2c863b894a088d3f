//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Runner/Adapter ── publish(Event) ──► Bus ──► Supervisor listener ──► SubscriberSet
//!                                                                      │
//!                                                        ┌─────────────┼──────────┐
//!                                                        ▼             ▼          ▼
//!                                                    LogWriter     Metrics     Custom
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
