//! Pulse Protocol - Event model and wire types
//!
//! This crate defines the event vocabulary shared by every stage of the
//! pipeline: the typed [`Event`] with its tagged variants, the canonical
//! byte-offset [`EventId`] minted by the tailing watcher, strict ingest-side
//! [`validate`] checks, and the [`BatchEnvelope`] frame sent to stream
//! clients.
//!
//! # Event JSON shape
//!
//! Events are flat JSON objects with an internal `type` tag:
//!
//! ```text
//! {"v":1,"ts":1700000000.5,"type":"file_touch","session_id":"s1",
//!  "path":"src/main.rs","kind":"write","id":"file_watcher:1024"}
//! ```
//!
//! Unknown top-level fields are preserved byte-for-byte through a
//! serialize/parse round trip; producers and consumers must tolerate them.
//!
//! # Canonical IDs
//!
//! `file_watcher:<byte-offset>` identifies the line-start offset of the
//! event in the append log. Gap markers derive their ID from the event that
//! triggered the drop episode (`<id>:gap`). IDs order by numeric offset
//! comparison, never lexicographically.

mod envelope;
mod error;
mod event;
mod id;
mod validate;

pub use envelope::BatchEnvelope;
pub use error::EventParseError;
pub use event::{
    AgentActivity, Event, EventKind, GapInfo, SessionState, ToolPhase, TouchKind, UnknownFields,
    SCHEMA_VERSION, SYSTEM_SESSION_ID,
};
pub use id::EventId;
pub use validate::{
    validate, validate_at, FieldError, ValidationErrors, MAX_COMMAND_BYTES, MAX_HOOK_NAME_BYTES,
    MAX_METADATA_BYTES, MAX_PATH_BYTES, MAX_PAYLOAD_KEYS, MAX_REASON_BYTES, MAX_SESSION_ID_BYTES,
    MAX_TOOL_BYTES, TS_FUTURE_SLACK_SECS,
};
