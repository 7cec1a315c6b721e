//! The broadcast queue
//!
//! One process-wide FIFO of pending events. Admission order is delivery
//! order; ordering is established here, at enqueue time, and nothing
//! downstream may reorder. Enqueue and flush both mutate the queue state
//! and are serialized behind one lock; flushes send with `try_send`, so
//! the lock is never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
// tokio's Instant so the recent-window honors the test-util virtual clock.
use tokio::time::Instant;
use pulse_protocol::{BatchEnvelope, Event, EventId, EventKind};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::FanoutMetrics;
use crate::session::SessionManager;

/// Batch accumulation window
pub const BATCH_WINDOW: Duration = Duration::from_millis(50);

/// Maximum events per batch; reaching it flushes immediately
pub const MAX_BATCH_SIZE: usize = 100;

/// Queue soft cap; beyond it the oldest events drop under a gap marker
pub const QUEUE_SOFT_CAP: usize = 1000;

/// Recent-window for the ID-based duplicate filter
pub const RECENT_WINDOW: Duration = Duration::from_millis(5000);

/// Entries above which the recent map is purged inline
const RECENT_TRIM_THRESHOLD: usize = 2048;

/// Maintenance cadence for the drop-window trim
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

/// Cleanup cadence for disconnected sessions
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct QueueInner {
    /// Pending events, FIFO; a pending gap marker may sit at the front
    queue: VecDeque<Event>,
    /// Recently admitted IDs with their admission times
    recent: HashMap<String, Instant>,
    /// Last ID handed to sessions; seeds gap-marker `from_event_id`
    last_delivered_id: Option<EventId>,
    /// A flush task (immediate or windowed) is pending
    flush_scheduled: bool,
    /// The pending flush is immediate, not waiting out the window
    scheduled_immediate: bool,
    /// Abort handle for a pending window timer
    window_timer: Option<JoinHandle<()>>,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            recent: HashMap::new(),
            last_delivered_id: None,
            flush_scheduled: false,
            scheduled_immediate: false,
            window_timer: None,
        }
    }
}

/// The fan-out broadcaster
///
/// Owned by the process; the watcher enqueues, client sessions receive.
/// Must be used from within a tokio runtime.
pub struct Broadcaster {
    inner: Mutex<QueueInner>,
    sessions: SessionManager,
    metrics: FanoutMetrics,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner::new()),
            sessions: SessionManager::new(),
            metrics: FanoutMetrics::new(),
        })
    }

    /// The session registry (connect/disconnect side)
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Fan-out counters
    pub fn metrics(&self) -> &FanoutMetrics {
        &self.metrics
    }

    /// Current queue depth (pending gap markers included)
    pub fn queue_depth(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Admit one event into the queue
    ///
    /// Applies the recent-window duplicate filter, the soft cap with gap
    /// marker synthesis, and the flush scheduling policy.
    pub fn enqueue(self: &Arc<Self>, event: Event) {
        let mut inner = self.inner.lock();

        // Layer-two duplicate suppression: an ID seen within the window is
        // cross-path duplication (e.g. an external producer re-injected a
        // line). Outside the window the ID may be re-admitted, so a
        // legitimate post-rotation offset reuse is not blacklisted.
        if let Some(id) = &event.id {
            let now = Instant::now();
            let key = id.as_str();
            if let Some(admitted_at) = inner.recent.get(key) {
                if now.duration_since(*admitted_at) < RECENT_WINDOW {
                    self.metrics.record_duplicate();
                    warn!(id = key, "duplicate ID within recent window, dropping event");
                    return;
                }
            }
            inner.recent.insert(key.to_string(), now);
            if inner.recent.len() > RECENT_TRIM_THRESHOLD {
                inner
                    .recent
                    .retain(|_, at| now.duration_since(*at) < RECENT_WINDOW);
            }
        }

        let was_empty = inner.queue.is_empty();
        let trigger_id = event.id.clone();
        inner.queue.push_back(event);

        if inner.queue.len() > QUEUE_SOFT_CAP {
            self.shed_oldest(&mut inner, trigger_id.as_ref());
        }

        if inner.queue.len() >= MAX_BATCH_SIZE {
            self.schedule_flush(&mut inner, true);
        } else if !inner.flush_scheduled {
            // Leading edge: an event admitted into an empty queue is not
            // delayed by the batch window.
            self.schedule_flush(&mut inner, was_empty);
        }
    }

    /// Drop the oldest events over the cap and leave one gap marker per
    /// episode at the head of the queue
    fn shed_oldest(&self, inner: &mut QueueInner, trigger_id: Option<&EventId>) {
        // An undelivered marker from this episode is folded into the new
        // one rather than stacking a marker per dropped event.
        let pending_marker = inner
            .queue
            .front()
            .is_some_and(|front| front.is_gap_marker());
        let (mut dropped_count, from_event_id) = if pending_marker {
            let marker = inner.queue.pop_front().expect("front exists");
            match marker.kind {
                EventKind::Unknown(u) => {
                    let gap = u.gap.expect("gap marker has gap info");
                    (gap.dropped_count, Some(EventId::new(gap.from_event_id)))
                }
                _ => unreachable!("is_gap_marker implies unknown variant"),
            }
        } else {
            (0, inner.last_delivered_id.clone())
        };

        let excess = inner.queue.len().saturating_sub(QUEUE_SOFT_CAP);
        let mut newest_dropped_offset = 0;
        for _ in 0..excess {
            if let Some(dropped) = inner.queue.pop_front() {
                if let Some(offset) = dropped.id.as_ref().and_then(|id| id.offset()) {
                    newest_dropped_offset = offset;
                }
                dropped_count += 1;
            }
        }

        self.metrics.record_dropped(excess as u64);
        warn!(
            dropped = excess,
            total_in_episode = dropped_count,
            "queue over soft cap, shed oldest events"
        );

        let fallback = EventId::new("unknown");
        let trigger = trigger_id.unwrap_or(&fallback);
        let marker = Event::gap_marker(
            now_ts(),
            trigger,
            dropped_count,
            from_event_id.as_ref(),
            newest_dropped_offset,
        );
        inner.queue.push_front(marker);
    }

    /// Schedule a flush if one is not already pending; immediate
    /// scheduling cancels a pending window timer
    fn schedule_flush(self: &Arc<Self>, inner: &mut QueueInner, immediate: bool) {
        if immediate && inner.flush_scheduled && !inner.scheduled_immediate {
            if let Some(timer) = inner.window_timer.take() {
                timer.abort();
            }
            inner.flush_scheduled = false;
        }

        if inner.flush_scheduled {
            return;
        }
        inner.flush_scheduled = true;
        inner.scheduled_immediate = immediate;

        let broadcaster = Arc::clone(self);
        if immediate {
            tokio::spawn(async move {
                broadcaster.flush_now();
            });
        } else {
            inner.window_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(BATCH_WINDOW).await;
                broadcaster.flush_now();
            }));
        }
    }

    /// Drain up to one batch and deliver it to every session
    pub fn flush_now(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        inner.flush_scheduled = false;
        inner.scheduled_immediate = false;
        inner.window_timer = None;

        if inner.queue.is_empty() {
            return;
        }

        let count = inner.queue.len().min(MAX_BATCH_SIZE);
        let events: Vec<Event> = inner.queue.drain(..count).collect();

        debug_assert_batch_ordered(&events);

        let first_id = events.iter().find_map(|e| e.id.clone());
        let last_id = events.iter().rev().find_map(|e| e.id.clone());
        let watermark_reset = events.iter().any(|e| e.id.is_none());

        if let Some(id) = &last_id {
            inner.last_delivered_id = Some(id.clone());
        }

        let envelope = BatchEnvelope::new(events);
        let frame = envelope.to_frame();

        let evicted = self.sessions.broadcast(
            &frame,
            first_id.as_ref(),
            last_id.as_ref(),
            watermark_reset,
        );
        for _ in 0..evicted {
            self.metrics.record_eviction();
        }

        self.metrics.record_batch(envelope.events.len() as u64);
        debug!(
            events = envelope.events.len(),
            remaining = inner.queue.len(),
            sessions = self.sessions.count(),
            "flushed batch"
        );

        if !inner.queue.is_empty() {
            let immediate = inner.queue.len() >= MAX_BATCH_SIZE;
            self.schedule_flush(&mut inner, immediate);
        }
    }

    /// Spawn the maintenance task: trims the drop window every 10 s and
    /// sweeps disconnected sessions every 5 s
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            let mut trim = tokio::time::interval(MAINTENANCE_INTERVAL);
            let mut cleanup = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = trim.tick() => {
                        broadcaster.metrics.trim_drop_window();
                    }
                    _ = cleanup.tick() => {
                        broadcaster.sessions.cleanup_disconnected();
                    }
                }
            }
        })
    }
}

/// Within a batch, canonical IDs must be strictly increasing by offset.
/// Gap markers and unmarked system events sit outside the offset
/// sequence and are exempt.
fn debug_assert_batch_ordered(events: &[Event]) {
    if cfg!(debug_assertions) {
        let mut prev: Option<u64> = None;
        for event in events {
            if event.is_gap_marker() {
                continue;
            }
            let Some(offset) = event.id.as_ref().and_then(|id| id.offset()) else {
                // Reset marker: the offset sequence legitimately restarts.
                prev = None;
                continue;
            };
            if let Some(p) = prev {
                debug_assert!(
                    offset > p,
                    "batch ordering violated: offset {offset} after {p}"
                );
            }
            prev = Some(offset);
        }
    }
}

fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
