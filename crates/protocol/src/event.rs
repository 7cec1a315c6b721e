//! Typed event model
//!
//! Events are immutable after construction. The JSON shape is flat: common
//! fields plus variant fields selected by the `type` tag, with any unknown
//! top-level fields carried through untouched in [`Event::extra`].
//!
//! Serialization is canonical: a fixed field order (`v`, `ts`, `type`,
//! `session_id`, variant fields, `id`, `metadata`) followed by the preserved
//! extra fields. Serialize-then-parse of any event yields an equal event.
//!
//! `Serialize`/`Deserialize` are implemented by hand over a JSON map. A
//! derived internally-tagged enum flattened next to a catch-all map would
//! let the two captures overlap; the manual impl keeps each key owned by
//! exactly one field.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::EventParseError;
use crate::id::EventId;

/// The only schema version this pipeline speaks
pub const SCHEMA_VERSION: u64 = 1;

/// Session ID attached to system-synthesized events (gap and reset markers)
pub const SYSTEM_SESSION_ID: &str = "system";

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    Stop,
    Interrupt,
    Crash,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Interrupt => "interrupt",
            Self::Crash => "crash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "interrupt" => Some(Self::Interrupt),
            "crash" => Some(Self::Crash),
            _ => None,
        }
    }
}

/// File access kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    Read,
    Write,
}

impl TouchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            _ => None,
        }
    }
}

/// Tool invocation phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Start,
    End,
}

impl ToolPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

/// Agent activity states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentActivity {
    Thinking,
    Responding,
}

impl AgentActivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Responding => "responding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thinking" => Some(Self::Thinking),
            "responding" => Some(Self::Responding),
            _ => None,
        }
    }
}

/// Variant-specific payload, selected by the `type` tag
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Session {
        state: SessionState,
        repo_root: Option<String>,
    },
    FileTouch {
        path: String,
        kind: TouchKind,
    },
    ToolCall {
        tool: String,
        phase: ToolPhase,
        command: Option<String>,
    },
    AgentState {
        state: AgentActivity,
    },
    Unknown(UnknownFields),
}

impl EventKind {
    /// The wire value of the `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::FileTouch { .. } => "file_touch",
            Self::ToolCall { .. } => "tool_call",
            Self::AgentState { .. } => "agent_state",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Fields of the `unknown` variant
///
/// The hook payload normalizer emits these for payloads it cannot type;
/// the pipeline itself emits them for gap and reset markers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnknownFields {
    /// Top-level keys of the original opaque payload
    pub payload_keys: Vec<String>,
    /// Human-readable explanation (reset markers: why the stream reset)
    pub reason: Option<String>,
    /// Name of the editor hook that produced the payload
    pub hook_event_name: Option<String>,
    /// Present only on gap markers
    pub gap: Option<GapInfo>,
}

/// Backpressure gap-marker payload
#[derive(Debug, Clone, PartialEq)]
pub struct GapInfo {
    /// Always `"dropped"` for markers this pipeline synthesizes
    pub gap_type: String,
    /// Number of events omitted in this episode
    pub dropped_count: u64,
    /// Last ID delivered before the episode, or `"unknown"`
    pub from_event_id: String,
    /// Offset embedded in the newest dropped event's ID
    pub to_offset: u64,
}

/// A single telemetry event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Schema version (1)
    pub v: u64,
    /// Wall-clock seconds, fractional
    pub ts: f64,
    /// Producing session, never empty
    pub session_id: String,
    /// Canonical ID; minted by the watcher, absent until then
    pub id: Option<EventId>,
    /// Variant payload
    pub kind: EventKind,
    /// Optional free-form mapping
    pub metadata: Option<Value>,
    /// Unknown top-level fields, preserved but untrusted
    pub extra: Map<String, Value>,
}

impl Event {
    /// Create an event with no ID, metadata, or extra fields
    pub fn new(ts: f64, session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            v: SCHEMA_VERSION,
            ts,
            session_id: session_id.into(),
            id: None,
            kind,
            metadata: None,
            extra: Map::new(),
        }
    }

    /// Synthesize a backpressure gap marker
    ///
    /// `trigger` is the ID of the event whose admission overflowed the
    /// queue; the marker's own ID derives from it with a `:gap` suffix.
    pub fn gap_marker(
        ts: f64,
        trigger: &EventId,
        dropped_count: u64,
        from_event_id: Option<&EventId>,
        to_offset: u64,
    ) -> Self {
        let mut event = Self::new(
            ts,
            SYSTEM_SESSION_ID,
            EventKind::Unknown(UnknownFields {
                reason: Some(format!("Dropped {dropped_count} events under backpressure")),
                gap: Some(GapInfo {
                    gap_type: "dropped".to_string(),
                    dropped_count,
                    from_event_id: from_event_id
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    to_offset,
                }),
                ..UnknownFields::default()
            }),
        );
        event.id = Some(EventId::gap_from(trigger));
        event
    }

    /// Synthesize the reset marker emitted after log truncation or rotation
    ///
    /// Reset markers carry no canonical ID: they do not correspond to any
    /// byte range of the log.
    pub fn reset_marker(ts: f64) -> Self {
        Self::new(
            ts,
            SYSTEM_SESSION_ID,
            EventKind::Unknown(UnknownFields {
                reason: Some("File truncated or rotated".to_string()),
                ..UnknownFields::default()
            }),
        )
    }

    /// Whether this event is a backpressure gap marker
    pub fn is_gap_marker(&self) -> bool {
        matches!(&self.kind, EventKind::Unknown(u) if u.gap.is_some())
    }

    /// Serialize to the canonical JSON line (no trailing newline)
    pub fn to_line(&self) -> String {
        // Event serialization cannot fail: all fields are JSON-native.
        serde_json::to_string(self).expect("event serialization is infallible")
    }

    /// Parse a log line leniently
    ///
    /// Bounds and the timestamp window are not checked here: lines in the
    /// log already passed ingest validation, and the log is the truth.
    pub fn from_line(line: &str) -> Result<Self, EventParseError> {
        Self::from_value(serde_json::from_str(line)?)
    }

    /// Lenient construction from a parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, EventParseError> {
        let Value::Object(mut map) = value else {
            return Err(EventParseError::NotAnObject);
        };

        let v = match map.remove("v") {
            Some(value) => value.as_u64().ok_or(EventParseError::Field("v"))?,
            None => SCHEMA_VERSION,
        };
        let ts = map
            .remove("ts")
            .and_then(|value| value.as_f64())
            .ok_or(EventParseError::Field("ts"))?;
        let type_tag = match map.remove("type") {
            Some(Value::String(s)) => s,
            _ => return Err(EventParseError::Field("type")),
        };
        let session_id = match map.remove("session_id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return Err(EventParseError::Field("session_id")),
        };
        let id = match map.remove("id") {
            Some(Value::String(s)) => Some(EventId::new(s)),
            Some(_) => return Err(EventParseError::Field("id")),
            None => None,
        };
        let metadata = map.remove("metadata");

        let kind = match type_tag.as_str() {
            "session" => EventKind::Session {
                state: take_enum(&mut map, "state", SessionState::parse)?,
                repo_root: take_opt_string(&mut map, "repo_root")?,
            },
            "file_touch" => EventKind::FileTouch {
                path: take_string(&mut map, "path")?,
                kind: take_enum(&mut map, "kind", TouchKind::parse)?,
            },
            "tool_call" => EventKind::ToolCall {
                tool: take_string(&mut map, "tool")?,
                phase: take_enum(&mut map, "phase", ToolPhase::parse)?,
                command: take_opt_string(&mut map, "command")?,
            },
            "agent_state" => EventKind::AgentState {
                state: take_enum(&mut map, "state", AgentActivity::parse)?,
            },
            "unknown" => EventKind::Unknown(take_unknown_fields(&mut map)?),
            other => return Err(EventParseError::UnknownType(other.to_string())),
        };

        Ok(Self {
            v,
            ts,
            session_id,
            id,
            kind,
            metadata,
            extra: map,
        })
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("v", &self.v)?;
        map.serialize_entry("ts", &self.ts)?;
        map.serialize_entry("type", self.kind.type_name())?;
        map.serialize_entry("session_id", &self.session_id)?;

        match &self.kind {
            EventKind::Session { state, repo_root } => {
                map.serialize_entry("state", state.as_str())?;
                if let Some(root) = repo_root {
                    map.serialize_entry("repo_root", root)?;
                }
            }
            EventKind::FileTouch { path, kind } => {
                map.serialize_entry("path", path)?;
                map.serialize_entry("kind", kind.as_str())?;
            }
            EventKind::ToolCall {
                tool,
                phase,
                command,
            } => {
                map.serialize_entry("tool", tool)?;
                map.serialize_entry("phase", phase.as_str())?;
                if let Some(command) = command {
                    map.serialize_entry("command", command)?;
                }
            }
            EventKind::AgentState { state } => {
                map.serialize_entry("state", state.as_str())?;
            }
            EventKind::Unknown(fields) => {
                if !fields.payload_keys.is_empty() {
                    map.serialize_entry("payload_keys", &fields.payload_keys)?;
                }
                if let Some(reason) = &fields.reason {
                    map.serialize_entry("reason", reason)?;
                }
                if let Some(name) = &fields.hook_event_name {
                    map.serialize_entry("hook_event_name", name)?;
                }
                if let Some(gap) = &fields.gap {
                    map.serialize_entry("gap_type", &gap.gap_type)?;
                    map.serialize_entry("dropped_count", &gap.dropped_count)?;
                    map.serialize_entry("from_event_id", &gap.from_event_id)?;
                    map.serialize_entry("to_offset", &gap.to_offset)?;
                }
            }
        }

        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        if let Some(metadata) = &self.metadata {
            map.serialize_entry("metadata", metadata)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Event::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn take_string(
    map: &mut Map<String, Value>,
    key: &'static str,
) -> Result<String, EventParseError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(EventParseError::Field(key)),
    }
}

fn take_opt_string(
    map: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, EventParseError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(EventParseError::Field(key)),
    }
}

fn take_enum<T>(
    map: &mut Map<String, Value>,
    key: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, EventParseError> {
    match map.remove(key) {
        Some(Value::String(s)) => parse(&s).ok_or(EventParseError::Field(key)),
        _ => Err(EventParseError::Field(key)),
    }
}

fn take_opt_u64(
    map: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Option<u64>, EventParseError> {
    match map.remove(key) {
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or(EventParseError::Field(key)),
        None => Ok(None),
    }
}

fn take_unknown_fields(map: &mut Map<String, Value>) -> Result<UnknownFields, EventParseError> {
    let payload_keys = match map.remove("payload_keys") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(EventParseError::Field("payload_keys")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(EventParseError::Field("payload_keys")),
        None => Vec::new(),
    };

    let reason = take_opt_string(map, "reason")?;
    let hook_event_name = take_opt_string(map, "hook_event_name")?;

    let gap = match take_opt_string(map, "gap_type")? {
        Some(gap_type) => Some(GapInfo {
            gap_type,
            dropped_count: take_opt_u64(map, "dropped_count")?
                .ok_or(EventParseError::Field("dropped_count"))?,
            from_event_id: take_string(map, "from_event_id")?,
            to_offset: take_opt_u64(map, "to_offset")?
                .ok_or(EventParseError::Field("to_offset"))?,
        }),
        None => None,
    };

    Ok(UnknownFields {
        payload_keys,
        reason,
        hook_event_name,
        gap,
    })
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
