//! Pulse Server - HTTP and stream surface of the pipeline
//!
//! # Endpoints
//!
//! - `POST /api/event` - validate and append one event (never broadcasts;
//!   the watcher observes the append through the filesystem)
//! - `GET /api/events` - historical reads with `tail` / `before_ts`
//! - `GET /api/stats` - read-only pipeline snapshot
//! - `GET /ws` - client stream socket delivering batch envelopes
//! - `GET /health` - liveness check
//!
//! The server holds the journal, broadcaster and watcher handles in
//! [`AppState`]; it owns none of the pipeline logic.

mod error;
mod history;
mod ingest;
mod stats;
mod ws;

#[cfg(test)]
mod routes_test;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Json, Router};
use pulse_fanout::Broadcaster;
use pulse_journal::Journal;
use pulse_watcher::TailWatcher;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::ServerError;
pub use ingest::MAX_BODY_BYTES;
pub use ws::MAX_FRAME_BYTES;

/// Watcher sink that feeds the broadcaster
///
/// The watcher crate only knows the [`pulse_watcher::EventSink`] seam;
/// this adapter closes the loop at wiring time.
pub struct BroadcastSink(pub Arc<Broadcaster>);

impl pulse_watcher::EventSink for BroadcastSink {
    fn deliver(&self, event: pulse_protocol::Event) {
        self.0.enqueue(event);
    }
}

/// Shared state for all handlers
pub struct AppState {
    pub journal: Arc<Journal>,
    pub broadcaster: Arc<Broadcaster>,
    pub watcher: Arc<TailWatcher>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        journal: Arc<Journal>,
        broadcaster: Arc<Broadcaster>,
        watcher: Arc<TailWatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            journal,
            broadcaster,
            watcher,
            start_time: Instant::now(),
        })
    }
}

/// Build the axum router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/event", post(ingest::ingest_event))
        .route("/api/events", get(history::read_events))
        .route("/api/stats", get(stats::stats))
        .route("/ws", get(ws::upgrade))
        .route("/health", get(health))
        .with_state(state)
}

/// Liveness check
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Bind and run the server until cancelled
pub async fn run(
    state: Arc<AppState>,
    bind_addr: &str,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ServerError::Bind {
            address: bind_addr.to_string(),
            source: e,
        })?;

    serve(listener, state, cancel).await
}

/// Run the server on an already-bound listener
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let address = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    tracing::info!(address = %address, "server listening");

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| ServerError::Http(e.to_string()))?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
}
