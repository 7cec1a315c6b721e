//! Stats probe
//!
//! `GET /api/stats` - a read-only snapshot assembled from the watcher,
//! the fan-out queue and the journal. Intended for health checks and
//! tests; it tolerates transient inconsistency between the owners and
//! never participates in correctness.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use pulse_fanout::FanoutSnapshot;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
struct StatsResponse {
    uptime_secs: u64,
    clients_connected: usize,
    queue_depth: usize,
    fanout: FanoutSnapshot,
    watcher: WatcherStats,
    journal: JournalStats,
}

#[derive(Debug, Serialize)]
struct WatcherStats {
    offset: u64,
    carry_bytes: usize,
    seen_ids: usize,
    consecutive_errors: u32,
    events_emitted: u64,
    duplicates_skipped: u64,
    lines_dropped: u64,
    rotations: u64,
}

#[derive(Debug, Serialize)]
struct JournalStats {
    path: String,
    size_bytes: u64,
    signature: Option<String>,
}

/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<impl Serialize> {
    let watcher = state.watcher.snapshot();

    Json(StatsResponse {
        uptime_secs: state.start_time.elapsed().as_secs(),
        clients_connected: state.broadcaster.sessions().count(),
        queue_depth: state.broadcaster.queue_depth(),
        fanout: state.broadcaster.metrics().snapshot(),
        watcher: WatcherStats {
            offset: watcher.last_offset,
            carry_bytes: watcher.carry_len,
            seen_ids: watcher.seen_len,
            consecutive_errors: watcher.consecutive_errors,
            events_emitted: watcher.events_emitted,
            duplicates_skipped: watcher.duplicates_skipped,
            lines_dropped: watcher.lines_dropped,
            rotations: watcher.rotations,
        },
        journal: JournalStats {
            path: state.journal.path().display().to_string(),
            size_bytes: state.journal.size(),
            signature: state.journal.signature(),
        },
    })
}
