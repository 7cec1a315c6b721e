//! Historical reads over the append log
//!
//! Serves `tail=N` and `before_ts=T` queries by scanning the log from
//! offset 0 and assigning the same `file_watcher:<offset>` IDs the live
//! watcher mints. The line-start arithmetic here must match the watcher
//! byte-for-byte, or historical and live IDs would disagree.
//!
//! Pages are always ascending by offset. `next_before` is the `ts` of the
//! first event in the page when older events remain, `None` once the page
//! reaches the start of the log.

use std::path::Path;

use pulse_protocol::{Event, EventId};

use crate::error::{JournalError, Result};

/// Default and maximum page size
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// A historical-read request
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Return the newest N events
    pub tail: Option<usize>,
    /// Return events with `ts` strictly below this value
    pub before_ts: Option<f64>,
    /// Page size; clamped to `1..=DEFAULT_HISTORY_LIMIT`
    pub limit: Option<usize>,
}

/// One page of historical events
#[derive(Debug, Clone)]
pub struct HistoryPage {
    /// Events ascending by offset
    pub events: Vec<Event>,
    /// Cursor for the next older page, if one exists
    pub next_before: Option<f64>,
}

/// Read a page of history from the log at `path`
///
/// A missing log yields an empty page. Corrupt and blank lines are
/// skipped; a trailing line without its newline is not yet an event and
/// is ignored.
pub fn read_history(path: &Path, query: &HistoryQuery) -> Result<HistoryPage> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(HistoryPage {
                events: Vec::new(),
                next_before: None,
            });
        }
        Err(e) => {
            return Err(JournalError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    let mut events = Vec::new();
    for (offset, line) in lines_with_offsets(&data) {
        let Ok(text) = std::str::from_utf8(line) else {
            tracing::debug!(offset, "skipping non-UTF-8 line");
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        match Event::from_line(text) {
            Ok(mut event) => {
                event.id = Some(EventId::from_offset(offset));
                events.push(event);
            }
            Err(e) => {
                tracing::debug!(offset, error = %e, "skipping unparseable line");
            }
        }
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, DEFAULT_HISTORY_LIMIT);

    let filtered: Vec<Event> = match query.before_ts {
        Some(cutoff) => events.into_iter().filter(|e| e.ts < cutoff).collect(),
        None => events,
    };

    let tail = match (query.tail, query.before_ts) {
        (Some(n), _) => n.min(limit),
        _ => limit,
    };

    let start = filtered.len().saturating_sub(tail);
    let has_older = start > 0;
    let page: Vec<Event> = filtered[start..].to_vec();

    let next_before = if has_older {
        page.first().map(|e| e.ts)
    } else {
        None
    };

    Ok(HistoryPage {
        events: page,
        next_before,
    })
}

/// Split a byte buffer into complete newline-terminated lines with their
/// start offsets
///
/// Trailing bytes after the last newline are not a line yet and are not
/// yielded; the live watcher treats them as carry.
fn lines_with_offsets(data: &[u8]) -> impl Iterator<Item = (u64, &[u8])> {
    let mut start = 0usize;
    std::iter::from_fn(move || {
        let rel = data.get(start..)?.iter().position(|&b| b == b'\n')?;
        let line_start = start;
        let line = &data[start..start + rel];
        start += rel + 1;
        Some((line_start as u64, line))
    })
}

#[cfg(test)]
#[path = "reader_test.rs"]
mod tests;
