//! Route handler tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pulse_fanout::Broadcaster;
use pulse_journal::Journal;
use pulse_watcher::TailWatcher;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use super::*;

fn test_state() -> (TempDir, Arc<AppState>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let journal = Arc::new(Journal::new(&path));
    let broadcaster = Broadcaster::new();
    let watcher = Arc::new(TailWatcher::new(
        &path,
        Arc::new(BroadcastSink(Arc::clone(&broadcaster))),
    ));
    (dir, AppState::new(journal, broadcaster, watcher))
}

fn valid_event_body() -> String {
    json!({
        "v": 1,
        "ts": 1.0,
        "type": "file_touch",
        "session_id": "s1",
        "path": "src/main.rs",
        "kind": "read"
    })
    .to_string()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 2 * 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_event(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/event")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (_dir, state) = test_state();
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

// =============================================================================
// Ingest
// =============================================================================

#[tokio::test]
async fn test_ingest_appends_without_broadcasting() {
    let (_dir, state) = test_state();
    let app = build_router(Arc::clone(&state));

    let response = app.oneshot(post_event(valid_event_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ok"], true);

    // The line landed in the journal...
    assert!(state.journal.size() > 0);
    // ...and nothing was enqueued: broadcast happens only through the
    // watcher observing the append.
    assert_eq!(state.broadcaster.queue_depth(), 0);
}

#[tokio::test]
async fn test_ingest_rejects_bad_json() {
    let (_dir, state) = test_state();
    let app = build_router(state);

    let response = app.oneshot(post_event("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_json");
}

#[tokio::test]
async fn test_ingest_rejects_invalid_event_with_details() {
    let (_dir, state) = test_state();
    let app = build_router(Arc::clone(&state));

    let body = json!({
        "v": 1,
        "ts": -5.0,
        "type": "file_touch",
        "session_id": "s",
        "kind": "read"
    })
    .to_string();
    let response = app.oneshot(post_event(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_event");
    let details = json["details"].as_array().unwrap();
    assert!(!details.is_empty());
    assert!(details.iter().any(|d| d["field"] == "ts"));
    assert!(details.iter().any(|d| d["field"] == "path"));

    // Refused events never reach the journal.
    assert_eq!(state.journal.size(), 0);
}

#[tokio::test]
async fn test_ingest_rejects_oversize_body() {
    let (_dir, state) = test_state();
    let app = build_router(state);

    let body = vec![b'x'; MAX_BODY_BYTES + 1];
    let response = app.oneshot(post_event(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_assigns_watcher_ids() {
    let (_dir, state) = test_state();
    let app = build_router(Arc::clone(&state));

    for _ in 0..2 {
        let ingest = app.clone().oneshot(post_event(valid_event_body())).await.unwrap();
        assert_eq!(ingest.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/events?tail=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["id"], "file_watcher:0");
    assert_eq!(json["next_before"], Value::Null);
}

#[tokio::test]
async fn test_history_with_missing_log() {
    let (_dir, state) = test_state();
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["events"].as_array().unwrap().is_empty());
}

// =============================================================================
// Stats
// =============================================================================

#[tokio::test]
async fn test_stats_snapshot_shape() {
    let (_dir, state) = test_state();
    let app = build_router(Arc::clone(&state));

    let ingest = app.clone().oneshot(post_event(valid_event_body())).await.unwrap();
    assert_eq!(ingest.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["clients_connected"], 0);
    assert_eq!(json["queue_depth"], 0);
    assert_eq!(json["watcher"]["offset"], 0);
    assert_eq!(json["watcher"]["consecutive_errors"], 0);
    assert!(json["journal"]["size_bytes"].as_u64().unwrap() > 0);
    assert!(json["fanout"]["events_delivered"].is_u64());
}
