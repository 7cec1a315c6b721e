//! Pulse Journal - The append-only event log
//!
//! Every event enters the pipeline through this log: the ingest endpoint
//! appends a canonical JSON line, and the tailing watcher observes the
//! append through the filesystem. Byte offsets into this file are the
//! ground truth for canonical event IDs, so both the live watcher and the
//! historical reader in this crate must agree on line-start arithmetic to
//! the byte.
//!
//! # File format
//!
//! UTF-8 text, one serialized event per line, `\n` terminated, no BOM, no
//! blank lines. Append-only, except for whole-stream truncation or
//! replacement (rotation), which the watcher detects separately.

mod error;
mod reader;
mod writer;

pub use error::{JournalError, Result};
pub use reader::{read_history, HistoryPage, HistoryQuery, DEFAULT_HISTORY_LIMIT};
pub use writer::Journal;
