//! Journal error types

use thiserror::Error;

/// Journal errors
#[derive(Debug, Error)]
pub enum JournalError {
    /// Filesystem failure on the log path
    #[error("journal I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for journal operations
pub type Result<T> = std::result::Result<T, JournalError>;
