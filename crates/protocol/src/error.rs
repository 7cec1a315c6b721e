//! Protocol error types

use thiserror::Error;

/// Errors from lenient event construction (watcher / history read path)
///
/// Strict ingest validation reports [`crate::ValidationErrors`] instead;
/// this type only covers lines that cannot be framed as events at all.
#[derive(Debug, Error)]
pub enum EventParseError {
    /// Line is not parseable JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Line parsed as JSON but is not an object
    #[error("event is not a JSON object")]
    NotAnObject,

    /// A structurally required field is missing or has the wrong JSON type
    #[error("missing or invalid field: {0}")]
    Field(&'static str),

    /// The `type` tag is not one of the known variants
    #[error("unrecognized event type: {0}")]
    UnknownType(String),
}
