//! The tailing watcher
//!
//! # Contract
//!
//! On each change signal, emit zero or more events in ascending canonical
//! ID order. Never emit a line that is not newline-terminated. Never emit
//! the same canonical ID twice within a generation.
//!
//! # Offset bookkeeping
//!
//! `last_offset` is the file read cursor: the position after every byte
//! consumed so far, including carry bytes. The carry (tail bytes of a read
//! that did not end in a newline) occupies the file range
//! `[last_offset - carry.len(), last_offset)`, so the combined buffer of
//! one read pass starts at `last_offset - carry_len_before_read` and a
//! line at position `p` within it starts at file offset `base + p`.
//!
//! # Single flight
//!
//! `reading` and `dirty` allow at most one read pass in flight. A `poke`
//! that arrives mid-read sets `dirty` and returns; the in-flight reader
//! loops once more after completing. The watcher owns its state
//! exclusively, so no other serialization is needed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use pulse_protocol::{Event, EventId};
use tracing::{debug, warn};

use crate::error::{Result, WatcherError};
use crate::seen::SeenSet;
use crate::sink::EventSink;

/// Consecutive read failures tolerated before a full reinitialize
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Pause before reinitializing after repeated failures
const REINIT_DELAY: Duration = Duration::from_millis(500);

/// State owned exclusively by the watcher
#[derive(Debug)]
struct WatcherState {
    /// File read cursor; bytes consumed so far including carry
    last_offset: u64,
    /// Bytes read but not yet newline-terminated; never contains `\n`
    carry: Vec<u8>,
    /// Line-start offset of the last emission; strictly increasing
    last_emitted_offset: Option<u64>,
    /// Canonical IDs emitted this generation
    seen: SeenSet,
    /// Transient-failure counter
    consecutive_errors: u32,
}

impl WatcherState {
    fn new() -> Self {
        Self {
            last_offset: 0,
            carry: Vec::new(),
            last_emitted_offset: None,
            seen: SeenSet::new(),
            consecutive_errors: 0,
        }
    }
}

/// Read-only view of watcher internals for the stats probe
#[derive(Debug, Clone, Copy)]
pub struct WatcherSnapshot {
    pub last_offset: u64,
    pub carry_len: usize,
    pub seen_len: usize,
    pub consecutive_errors: u32,
    pub events_emitted: u64,
    pub duplicates_skipped: u64,
    pub lines_dropped: u64,
    pub rotations: u64,
}

/// Single-flight byte tail over the append log
pub struct TailWatcher {
    path: PathBuf,
    sink: Arc<dyn EventSink>,
    state: Mutex<WatcherState>,

    // Single-flight coordination.
    reading: AtomicBool,
    dirty: AtomicBool,

    events_emitted: AtomicU64,
    duplicates_skipped: AtomicU64,
    lines_dropped: AtomicU64,
    rotations: AtomicU64,
}

impl TailWatcher {
    /// Create a watcher over `path`, delivering to `sink`
    ///
    /// The cursor starts at 0; production startup calls
    /// [`initialize_at_end`](Self::initialize_at_end) so only new events
    /// are streamed. Starting at 0 would replay the entire history on
    /// every restart.
    pub fn new(path: impl Into<PathBuf>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            path: path.into(),
            sink,
            state: Mutex::new(WatcherState::new()),
            reading: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            events_emitted: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
        }
    }

    /// The log path being tailed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position the cursor at the current end of the log
    pub fn initialize_at_end(&self) {
        let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let mut state = self.state.lock();
        state.last_offset = size;
        state.carry.clear();
        debug!(offset = size, "watcher cursor initialized at end of log");
    }

    /// Whether the log has bytes beyond the cursor (cheap stat)
    pub fn needs_read(&self) -> bool {
        let cursor = self.state.lock().last_offset;
        match std::fs::metadata(&self.path) {
            Ok(m) => m.len() != cursor,
            Err(_) => false,
        }
    }

    /// Handle a change signal
    ///
    /// Single-flight: if a read pass is in flight this only marks `dirty`;
    /// the in-flight pass re-runs once after completion.
    pub async fn poke(&self) {
        if self.reading.swap(true, Ordering::AcqRel) {
            self.dirty.store(true, Ordering::Release);
            return;
        }

        loop {
            self.read_pass().await;
            if !self.dirty.swap(false, Ordering::AcqRel) {
                break;
            }
        }

        self.reading.store(false, Ordering::Release);
    }

    /// One guarded read pass with the transient-error policy applied
    async fn read_pass(&self) {
        match self.process_available() {
            Ok(()) => {
                self.state.lock().consecutive_errors = 0;
            }
            Err(e) => {
                let errors = {
                    let mut state = self.state.lock();
                    state.consecutive_errors += 1;
                    // Intentionally lossy below the threshold: the next
                    // attempt rereads from scratch and the log is the truth.
                    state.last_offset = 0;
                    state.carry.clear();
                    state.consecutive_errors
                };
                warn!(error = %e, consecutive = errors, "tail read failed");

                if errors >= MAX_CONSECUTIVE_ERRORS {
                    {
                        let mut state = self.state.lock();
                        state.seen.clear();
                        state.last_emitted_offset = None;
                        state.consecutive_errors = 0;
                    }
                    warn!("too many consecutive failures, reinitializing watcher");
                    tokio::time::sleep(REINIT_DELAY).await;
                    self.initialize_at_end();
                }
            }
        }
    }

    /// Stat, detect rotation, read new bytes, frame and emit lines
    fn process_available(&self) -> Result<()> {
        let mut state = self.state.lock();

        let size = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(WatcherError::Io)?;

        if size < state.last_offset {
            self.handle_rotation(&mut state, size);
        }

        if size == state.last_offset {
            return Ok(());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(state.last_offset))?;
        let mut chunk = Vec::new();
        file.read_to_end(&mut chunk)?;
        if chunk.is_empty() {
            return Ok(());
        }

        let base = state.last_offset - state.carry.len() as u64;
        let mut combined = std::mem::take(&mut state.carry);
        combined.extend_from_slice(&chunk);
        state.last_offset += chunk.len() as u64;

        let mut line_start = 0usize;
        while let Some(rel) = combined[line_start..].iter().position(|&b| b == b'\n') {
            let line_end = line_start + rel;
            let start_offset = base + line_start as u64;
            if !self.emit_line(&mut state, start_offset, &combined[line_start..line_end]) {
                // State violation mid-pass; the generation was reset and
                // the rest of this buffer no longer has valid offsets.
                return Ok(());
            }
            line_start = line_end + 1;
        }

        state.carry = combined[line_start..].to_vec();
        debug_assert!(
            !state.carry.contains(&b'\n'),
            "carry must never contain a newline"
        );

        Ok(())
    }

    /// Emit one framed line; returns false on a state violation
    fn emit_line(&self, state: &mut WatcherState, start_offset: u64, bytes: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(bytes) else {
            self.lines_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(offset = start_offset, "dropping non-UTF-8 line");
            return true;
        };
        if text.trim().is_empty() {
            return true;
        }

        // Early rejection: a duplicate ID is skipped without parsing.
        if state.seen.contains(start_offset) {
            self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(offset = start_offset, "duplicate canonical ID, skipping line");
            return true;
        }

        // Mark before parsing; un-mark on failure so a corrected line can
        // be re-ingested under the same offset.
        state.seen.insert(start_offset);

        let mut event = match Event::from_line(text) {
            Ok(event) => event,
            Err(e) => {
                state.seen.remove(start_offset);
                self.lines_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(offset = start_offset, error = %e, "dropping unparseable line");
                return true;
            }
        };

        if let Some(prev) = state.last_emitted_offset {
            debug_assert!(
                start_offset > prev,
                "emitted offsets must be strictly increasing"
            );
            if start_offset <= prev {
                warn!(
                    offset = start_offset,
                    prev, "emitted offset regressed, resetting watcher state"
                );
                self.reset_generation(state);
                return false;
            }
        }
        state.last_emitted_offset = Some(start_offset);

        event.id = Some(EventId::from_offset(start_offset));
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.sink.deliver(event);
        true
    }

    /// Rotation protocol: reset the generation and surface a visible
    /// discontinuity to subscribers
    fn handle_rotation(&self, state: &mut WatcherState, size: u64) {
        warn!(
            size,
            cursor = state.last_offset,
            "log truncated or rotated, starting new generation"
        );
        self.reset_generation(state);
        self.rotations.fetch_add(1, Ordering::Relaxed);
        self.sink.deliver(Event::reset_marker(now_ts()));
    }

    fn reset_generation(&self, state: &mut WatcherState) {
        state.last_offset = 0;
        state.carry.clear();
        state.seen.clear();
        state.last_emitted_offset = None;
    }

    /// Read-only snapshot for the stats probe; tolerates transient
    /// inconsistency between the counters and the locked state
    pub fn snapshot(&self) -> WatcherSnapshot {
        let state = self.state.lock();
        WatcherSnapshot {
            last_offset: state.last_offset,
            carry_len: state.carry.len(),
            seen_len: state.seen.len(),
            consecutive_errors: state.consecutive_errors,
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TailWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailWatcher")
            .field("path", &self.path)
            .field("reading", &self.reading.load(Ordering::Relaxed))
            .finish()
    }
}

fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
#[path = "tail_test.rs"]
mod tests;
