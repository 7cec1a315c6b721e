//! Pulse Configuration
//!
//! TOML-based configuration loading with sensible defaults. A minimal
//! config should just work - only specify what you need to change.
//!
//! Batching parameters (window, batch ceiling, queue cap, duplicate
//! window) are deliberately not configurable: they are part of the
//! delivery contract, fixed in `pulse-fanout`.
//!
//! # Example Minimal Config
//!
//! ```toml
//! [journal]
//! path = ".pulse/events.jsonl"
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 4177
//!
//! [journal]
//! path = ".pulse/events.jsonl"
//!
//! [log]
//! level = "info"
//! format = "console"
//! output = "stdout"
//! ```

mod error;
mod journal;
mod logging;
mod server;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use journal::JournalConfig;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use server::ServerConfig;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP/stream server settings
    pub server: ServerConfig,

    /// Append log location
    pub journal: JournalConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.journal.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "journal.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
