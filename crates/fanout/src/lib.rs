//! Pulse Fanout - Ordered batch delivery to stream clients
//!
//! The broadcaster owns the single process-wide event queue. Events enter
//! in canonical order from the watcher, pass a recent-window duplicate
//! filter, and leave as ordered batch envelopes delivered to every
//! connected client session. Loss is explicit: when the queue overflows
//! its soft cap, the oldest events are dropped and a single gap marker
//! takes their place at the head of the queue.
//!
//! # Architecture
//!
//! ```text
//! watcher ──enqueue──▶ Broadcaster
//!                        ├── recent-window dedup (5 s)
//!                        ├── FIFO queue (soft cap 1000, gap markers)
//!                        └── flush: leading edge / 50 ms window / max 100
//!                              │ one serialized envelope per batch
//!                              ▼
//!                        SessionManager ──try_send──▶ client sessions
//!                              │ send failure = eviction
//! ```
//!
//! # Scheduling
//!
//! - An event admitted into an empty queue flushes on the next scheduler
//!   turn (leading edge) — first events are not delayed by the window.
//! - Reaching the batch-size ceiling cancels any pending window timer and
//!   flushes immediately.
//! - Otherwise a 50 ms window timer accumulates admissions into one batch.
//!
//! The broadcaster must live inside a tokio runtime: flush scheduling
//! spawns tasks.

mod metrics;
mod queue;
mod session;

pub use metrics::{FanoutMetrics, FanoutSnapshot};
pub use queue::{Broadcaster, BATCH_WINDOW, MAX_BATCH_SIZE, QUEUE_SOFT_CAP, RECENT_WINDOW};
pub use session::{ClientSession, SessionManager, SESSION_CHANNEL_CAPACITY};
