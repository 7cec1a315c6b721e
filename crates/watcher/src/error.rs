//! Watcher error types

use thiserror::Error;

/// Watcher errors
#[derive(Debug, Error)]
pub enum WatcherError {
    /// Filesystem failure while tailing the log
    #[error("watcher I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem notification backend failure
    #[error("change notification error: {0}")]
    Notify(#[from] notify::Error),

    /// A watcher is already running in this process
    #[error("a tailing watcher is already running in this process")]
    AlreadyRunning,
}

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatcherError>;
