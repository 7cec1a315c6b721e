//! Pulse Watcher - Single-flight tail over the append log
//!
//! The watcher is the only component that mints canonical event IDs. It
//! tails the journal file byte-by-byte, frames complete newline-terminated
//! lines, assigns `file_watcher:<line-start-offset>` IDs, suppresses
//! duplicate IDs within its generation, and hands events to a sink (the
//! fan-out queue in production).
//!
//! # Architecture
//!
//! ```text
//! ingest ──append──▶ events.jsonl
//!                        │ fs change signal (notify) + catch-up sweep
//!                        ▼
//!                  TailWatcher::poke()          ◄── single-flight
//!                        │ frame lines, mint IDs, dedup
//!                        ▼
//!                  EventSink::deliver()         ──▶ fan-out queue
//! ```
//!
//! Exactly one watcher may run per process; a second `run` refuses with a
//! visible diagnostic. Tests construct [`TailWatcher`] instances directly
//! and drive [`TailWatcher::poke`] without the process-wide guard.

mod error;
mod seen;
mod signal;
mod sink;
mod tail;

pub use error::{Result, WatcherError};
pub use seen::SeenSet;
pub use signal::run;
pub use sink::EventSink;
pub use tail::{TailWatcher, WatcherSnapshot};
