//! Strict ingest-side validation
//!
//! Validation runs over the raw JSON value before anything is appended to
//! the log. It is pure: nothing is mutated, and data problems are reported
//! as collected [`FieldError`]s rather than panics. All length bounds are
//! in bytes of the UTF-8 representation.
//!
//! The watcher does not re-validate lines it tails; the log is the truth
//! and lines in it already passed this gate (see [`Event::from_line`]).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use crate::event::{
    AgentActivity, Event, SessionState, ToolPhase, TouchKind, SCHEMA_VERSION,
};

/// Maximum `session_id` length
pub const MAX_SESSION_ID_BYTES: usize = 256;
/// Maximum `file_touch.path` length
pub const MAX_PATH_BYTES: usize = 4096;
/// Maximum `tool_call.tool` length
pub const MAX_TOOL_BYTES: usize = 256;
/// Maximum `tool_call.command` length
pub const MAX_COMMAND_BYTES: usize = 8192;
/// Maximum `unknown.reason` length
pub const MAX_REASON_BYTES: usize = 512;
/// Maximum `unknown.hook_event_name` length
pub const MAX_HOOK_NAME_BYTES: usize = 256;
/// Maximum number of `unknown.payload_keys` entries
pub const MAX_PAYLOAD_KEYS: usize = 100;
/// Maximum serialized `metadata` size
pub const MAX_METADATA_BYTES: usize = 10_000;
/// How far into the future `ts` may point
pub const TS_FUTURE_SLACK_SECS: f64 = 60.0;

/// A single validation failure, tied to the offending field
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    /// Top-level field name
    pub field: String,
    /// What was wrong with it
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All validation failures for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event validation failed: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a raw event against the schema, using the system clock for the
/// timestamp window
pub fn validate(raw: &Value) -> Result<Event, ValidationErrors> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    validate_at(raw, now)
}

/// Validate a raw event with an explicit notion of "now"
///
/// Checks structural presence, JSON types, enum membership, byte-length
/// bounds, the timestamp window, and the serialized metadata size. All
/// failures are collected; the first error does not mask the rest.
pub fn validate_at(raw: &Value, now_secs: f64) -> Result<Event, ValidationErrors> {
    let Some(map) = raw.as_object() else {
        return Err(ValidationErrors(vec![FieldError::new(
            "event",
            "must be a JSON object",
        )]));
    };

    let mut errors = Vec::new();

    match map.get("v") {
        Some(v) if v.as_u64() == Some(SCHEMA_VERSION) => {}
        Some(_) => errors.push(FieldError::new("v", "must be the integer 1")),
        None => errors.push(FieldError::new("v", "is required")),
    }

    match map.get("ts").and_then(|v| v.as_f64()) {
        Some(ts) if ts < 0.0 => errors.push(FieldError::new("ts", "must be non-negative")),
        Some(ts) if ts > now_secs + TS_FUTURE_SLACK_SECS => {
            errors.push(FieldError::new("ts", "is too far in the future"));
        }
        Some(_) => {}
        None => errors.push(FieldError::new("ts", "must be a number")),
    }

    match map.get("session_id").and_then(|v| v.as_str()) {
        Some("") => errors.push(FieldError::new("session_id", "must not be empty")),
        Some(s) if s.len() > MAX_SESSION_ID_BYTES => errors.push(FieldError::new(
            "session_id",
            format!("exceeds {MAX_SESSION_ID_BYTES} bytes"),
        )),
        Some(_) => {}
        None => errors.push(FieldError::new("session_id", "must be a non-empty string")),
    }

    // Producers never mint IDs, but an ID that is present must at least be
    // well-formed so downstream offset comparisons cannot misbehave.
    if let Some(id) = map.get("id") {
        match id.as_str() {
            Some(s) if crate::EventId::new(s).offset().is_some() => {}
            _ => errors.push(FieldError::new(
                "id",
                "must have the form <source>:<non-negative integer>",
            )),
        }
    }

    if let Some(metadata) = map.get("metadata") {
        if !metadata.is_object() {
            errors.push(FieldError::new("metadata", "must be an object"));
        } else {
            let serialized = serde_json::to_string(metadata).unwrap_or_default();
            if serialized.len() > MAX_METADATA_BYTES {
                errors.push(FieldError::new(
                    "metadata",
                    format!("serialized size exceeds {MAX_METADATA_BYTES} bytes"),
                ));
            }
        }
    }

    match map.get("type").and_then(|v| v.as_str()) {
        Some("session") => {
            check_enum(map, "state", SessionState::parse, &mut errors);
            check_opt_string(map, "repo_root", usize::MAX, &mut errors);
        }
        Some("file_touch") => {
            check_string(map, "path", MAX_PATH_BYTES, &mut errors);
            check_enum(map, "kind", TouchKind::parse, &mut errors);
        }
        Some("tool_call") => {
            check_string(map, "tool", MAX_TOOL_BYTES, &mut errors);
            check_enum(map, "phase", ToolPhase::parse, &mut errors);
            check_opt_string(map, "command", MAX_COMMAND_BYTES, &mut errors);
        }
        Some("agent_state") => {
            check_enum(map, "state", AgentActivity::parse, &mut errors);
        }
        Some("unknown") => {
            check_payload_keys(map, &mut errors);
            check_opt_string(map, "reason", MAX_REASON_BYTES, &mut errors);
            check_opt_string(map, "hook_event_name", MAX_HOOK_NAME_BYTES, &mut errors);
        }
        Some(other) => errors.push(FieldError::new(
            "type",
            format!("unrecognized event type: {other}"),
        )),
        None => errors.push(FieldError::new("type", "must be a string")),
    }

    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }

    Event::from_value(raw.clone())
        .map_err(|e| ValidationErrors(vec![FieldError::new("event", e.to_string())]))
}

fn check_string(
    map: &serde_json::Map<String, Value>,
    field: &str,
    max_bytes: usize,
    errors: &mut Vec<FieldError>,
) {
    match map.get(field).and_then(|v| v.as_str()) {
        Some(s) if s.len() > max_bytes => {
            errors.push(FieldError::new(field, format!("exceeds {max_bytes} bytes")));
        }
        Some(_) => {}
        None => errors.push(FieldError::new(field, "must be a string")),
    }
}

fn check_opt_string(
    map: &serde_json::Map<String, Value>,
    field: &str,
    max_bytes: usize,
    errors: &mut Vec<FieldError>,
) {
    match map.get(field) {
        Some(Value::String(s)) if s.len() > max_bytes => {
            errors.push(FieldError::new(field, format!("exceeds {max_bytes} bytes")));
        }
        Some(Value::String(_)) | Some(Value::Null) | None => {}
        Some(_) => errors.push(FieldError::new(field, "must be a string")),
    }
}

fn check_enum<T>(
    map: &serde_json::Map<String, Value>,
    field: &str,
    parse: fn(&str) -> Option<T>,
    errors: &mut Vec<FieldError>,
) {
    match map.get(field).and_then(|v| v.as_str()) {
        Some(s) if parse(s).is_some() => {}
        Some(s) => errors.push(FieldError::new(field, format!("invalid value: {s}"))),
        None => errors.push(FieldError::new(field, "must be a string")),
    }
}

fn check_payload_keys(map: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
    match map.get("payload_keys") {
        Some(Value::Array(items)) => {
            if items.len() > MAX_PAYLOAD_KEYS {
                errors.push(FieldError::new(
                    "payload_keys",
                    format!("exceeds {MAX_PAYLOAD_KEYS} entries"),
                ));
            }
            if items.iter().any(|item| !item.is_string()) {
                errors.push(FieldError::new(
                    "payload_keys",
                    "entries must all be strings",
                ));
            }
        }
        Some(_) => errors.push(FieldError::new("payload_keys", "must be an array")),
        None => {}
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
