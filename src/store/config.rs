//! # Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Where the embedded database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// Private in-memory database, gone when the store is released.
    Memory,
    /// Database file (created if missing).
    File(PathBuf),
}

/// Configuration of the embedded store.
///
/// ## Field semantics
/// - `location`: in-memory or file-backed database
/// - `busy_timeout`: how long SQLite waits on a locked database file
/// - `stream_buffer`: rows produced ahead of the consumer by `stream` (min 1)
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Database location.
    pub location: StoreLocation,
    /// SQLite busy timeout.
    pub busy_timeout: Duration,
    /// Read-ahead of streaming cursors, in rows.
    pub stream_buffer: usize,
}

impl StoreConfig {
    /// In-memory database with default settings.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed database with default settings.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Returns the stream read-ahead clamped to a minimum of 1.
    #[inline]
    pub fn stream_buffer_clamped(&self) -> usize {
        self.stream_buffer.max(1)
    }
}

impl Default for StoreConfig {
    /// Default configuration:
    ///
    /// - `location = Memory`
    /// - `busy_timeout = 5s`
    /// - `stream_buffer = 64`
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout: Duration::from_secs(5),
            stream_buffer: 64,
        }
    }
}
