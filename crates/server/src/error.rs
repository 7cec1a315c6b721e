//! Server error types and response helpers

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listen address
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP serving failure
    #[error("HTTP server error: {0}")]
    Http(String),
}

/// Build a JSON error response: `{"error": <code>, "message": <message>}`
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
