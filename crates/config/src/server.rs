//! Server configuration

use serde::Deserialize;

/// HTTP and stream server settings
///
/// # Example
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 4177
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    /// Default: 127.0.0.1
    pub host: String,

    /// Bind port
    /// Default: 4177
    pub port: u16,
}

impl ServerConfig {
    /// Bind address in `host:port` form
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4177,
        }
    }
}
