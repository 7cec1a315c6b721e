//! Atomic line appends
//!
//! The journal opens the log for each append rather than holding a file
//! handle: appends are hook-frequency (not high-throughput), and a fresh
//! open means an externally rotated or replaced file is always appended
//! at its current end rather than through a stale handle.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pulse_protocol::Event;

use crate::error::{JournalError, Result};

/// Handle to the append-only event log
///
/// `append` is the only mutation. Within this process appends are
/// serialized by an internal lock; across processes the log relies on
/// `O_APPEND` filesystem semantics, as external writers are also allowed
/// to append complete lines.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    // Serializes append offset bookkeeping within this process.
    write_lock: Mutex<()>,
}

impl Journal {
    /// Create a journal handle for the given log path
    ///
    /// The file itself is created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The log path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a canonical JSON line plus terminating newline
    ///
    /// Returns the byte offset at which the line starts; after the watcher
    /// tails this line it will carry `file_watcher:<that offset>` as its
    /// canonical ID. The line and newline go out in a single `write_all`.
    pub fn append(&self, event: &Event) -> Result<u64> {
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        let start_offset = file.metadata().map_err(|e| self.io_err(e))?.len();

        let mut line = event.to_line().into_bytes();
        line.push(b'\n');
        file.write_all(&line).map_err(|e| self.io_err(e))?;

        tracing::trace!(
            offset = start_offset,
            bytes = line.len(),
            "appended event line"
        );

        Ok(start_offset)
    }

    /// Current size of the log in bytes (0 when the file does not exist)
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Identifying signature of the current log file, for the stats probe
    ///
    /// `dev:inode` on unix; changes when the file is replaced.
    pub fn signature(&self) -> Option<String> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            std::fs::metadata(&self.path)
                .ok()
                .map(|m| format!("{}:{}", m.dev(), m.ino()))
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn io_err(&self, source: std::io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod tests;
