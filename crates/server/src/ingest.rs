//! Ingest endpoint
//!
//! `POST /api/event` with a single JSON object body. Size-caps, parses,
//! validates, appends. It deliberately does not broadcast: the watcher is
//! the single minting authority for canonical IDs, so every delivered
//! event carries a byte-derived ID regardless of which process appended
//! the line.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use crate::error::error_response;
use crate::AppState;

/// Request body cap
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// POST /api/event
pub async fn ingest_event(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if body.len() > MAX_BODY_BYTES {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "too_large",
            format!("body size {} exceeds limit {}", body.len(), MAX_BODY_BYTES),
        );
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "ingest body is not JSON");
            return error_response(StatusCode::BAD_REQUEST, "bad_json", e.to_string());
        }
    };

    let event = match pulse_protocol::validate(&raw) {
        Ok(event) => event,
        Err(errors) => {
            debug!(count = errors.0.len(), "event failed validation");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_event",
                    "details": errors.0,
                })),
            )
                .into_response();
        }
    };

    match state.journal.append(&event) {
        Ok(offset) => {
            debug!(offset, session_id = %event.session_id, "event appended");
            (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "journal append failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "io", e.to_string())
        }
    }
}
