//! Canonical event identifiers
//!
//! The tailing watcher is the single minting authority for event IDs. An ID
//! encodes the byte offset of the event's line start in the append log:
//! `file_watcher:<offset>`. Gap markers append a `:gap` suffix to the ID of
//! the event that triggered the drop episode, which keeps them unique and
//! sortable next to the bracketing events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source tag for watcher-minted IDs
pub const WATCHER_SOURCE: &str = "file_watcher";

/// Canonical event identifier
///
/// Ordering between IDs is always by numeric offset comparison via
/// [`EventId::offset`]; the string form is only a wire representation.
///
/// # Example
///
/// ```
/// use pulse_protocol::EventId;
///
/// let id = EventId::from_offset(1024);
/// assert_eq!(id.as_str(), "file_watcher:1024");
/// assert_eq!(id.offset(), Some(1024));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create an ID from a raw string (wire form, untrusted)
    #[inline]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Mint the canonical ID for a line starting at `offset`
    #[inline]
    pub fn from_offset(offset: u64) -> Self {
        Self(format!("{WATCHER_SOURCE}:{offset}"))
    }

    /// Derive a gap-marker ID from the event that triggered the episode
    #[inline]
    pub fn gap_from(trigger: &EventId) -> Self {
        Self(format!("{}:gap", trigger.0))
    }

    /// Get the ID as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the byte offset encoded in this ID
    ///
    /// Returns `None` when the segment after the first colon is not a
    /// decimal integer (foreign or malformed IDs).
    pub fn offset(&self) -> Option<u64> {
        self.0.split(':').nth(1).and_then(|s| s.parse().ok())
    }

    /// Whether this ID identifies a gap marker
    #[inline]
    pub fn is_gap(&self) -> bool {
        self.0.ends_with(":gap")
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_test.rs"]
mod tests;
