//! Transport settings: bind address, connection limits, heartbeat.

use serde::{Deserialize, Serialize};

/// Server network and runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP and WebSocket port.
    pub port: u16,
    /// Maximum simultaneous WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is considered dead, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before drops begin.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 1024 * 1024,
            outbound_buffer: 256,
        }
    }
}
