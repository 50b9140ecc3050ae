//! Server configuration.

use std::time::Duration;

use callrelay_settings::ServerSettings;

/// Runtime configuration for [`crate::server::RelayServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence after which a connection is closed.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
            outbound_buffer: 256,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
            max_message_size: settings.max_message_size,
            outbound_buffer: settings.outbound_buffer,
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_ephemeral_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn from_settings_converts_durations() {
        let settings = ServerSettings {
            heartbeat_interval_ms: 1_500,
            heartbeat_timeout_ms: 4_000,
            port: 3000,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(1_500));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(4));
        assert_eq!(cfg.bind_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.outbound_buffer, 256);
    }
}
