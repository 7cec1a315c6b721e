//! Historical-read endpoint
//!
//! `GET /api/events?tail=N | before_ts=T [&limit=L]`. IDs are assigned
//! with the same byte-exact line-start arithmetic the live watcher uses.
//! Pages are ascending by offset; `next_before` is the cursor for the
//! next older page.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pulse_journal::{read_history, HistoryQuery};
use pulse_protocol::Event;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::error_response;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    tail: Option<usize>,
    before_ts: Option<f64>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    events: Vec<Event>,
    next_before: Option<f64>,
}

/// GET /api/events
pub async fn read_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let query = HistoryQuery {
        tail: params.tail,
        before_ts: params.before_ts,
        limit: params.limit,
    };

    match read_history(state.journal.path(), &query) {
        Ok(page) => Json(HistoryResponse {
            events: page.events,
            next_before: page.next_before,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "history read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "io", e.to_string())
        }
    }
}
