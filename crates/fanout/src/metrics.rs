//! Fan-out counters
//!
//! Lock-free counters plus a sliding window of drop timestamps for the
//! "dropped in the last 60 s" stat. The window list is trimmed by the
//! maintenance task every 10 seconds and on read.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Span of the recent-drops window
const DROP_WINDOW: Duration = Duration::from_secs(60);

/// Fan-out metrics
#[derive(Debug, Default)]
pub struct FanoutMetrics {
    batches_delivered: AtomicU64,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
    duplicates_suppressed: AtomicU64,
    sessions_evicted: AtomicU64,
    drop_timestamps: Mutex<VecDeque<(Instant, u64)>>,
}

impl FanoutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_batch(&self, event_count: u64) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.events_delivered.fetch_add(event_count, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.events_dropped.fetch_add(count, Ordering::Relaxed);
        self.drop_timestamps.lock().push_back((Instant::now(), count));
    }

    #[inline]
    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.sessions_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop entries older than the window; called every 10 s by the
    /// maintenance task
    pub fn trim_drop_window(&self) {
        // checked_sub: the monotonic clock may be younger than the window.
        let Some(cutoff) = Instant::now().checked_sub(DROP_WINDOW) else {
            return;
        };
        let mut timestamps = self.drop_timestamps.lock();
        while let Some(&(at, _)) = timestamps.front() {
            if at < cutoff {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events dropped within the last 60 seconds
    pub fn dropped_last_60s(&self) -> u64 {
        self.trim_drop_window();
        self.drop_timestamps
            .lock()
            .iter()
            .map(|&(_, count)| count)
            .sum()
    }

    /// Point-in-time snapshot for the stats probe
    pub fn snapshot(&self) -> FanoutSnapshot {
        FanoutSnapshot {
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            dropped_last_60s: self.dropped_last_60s(),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of the fan-out counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FanoutSnapshot {
    pub batches_delivered: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub dropped_last_60s: u64,
    pub duplicates_suppressed: u64,
    pub sessions_evicted: u64,
}
