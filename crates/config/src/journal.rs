//! Journal configuration

use std::path::PathBuf;

use serde::Deserialize;

/// Append log location
///
/// # Example
///
/// ```toml
/// [journal]
/// path = ".pulse/events.jsonl"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Path of the append-only event log
    /// Default: .pulse/events.jsonl
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".pulse/events.jsonl"),
        }
    }
}
