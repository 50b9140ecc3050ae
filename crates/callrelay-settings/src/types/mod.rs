//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields keep their compiled default.

mod logging;
mod registry;
mod server;

pub use logging::*;
pub use registry::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, SettingsError};

/// Smallest accepted heartbeat interval.
const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
/// Smallest accepted inbound message size.
const MIN_MESSAGE_SIZE: usize = 1024;

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 3000, "maxConnections": 1024 },
///   "registry": { "sentinelIdentity": "service" },
///   "logging": { "level": "info", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Transport settings.
    pub server: ServerSettings,
    /// Registration defaults.
    pub registry: RegistrySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Correct out-of-range values in place.
    ///
    /// Returns one note per correction. Fails only on values with no sane
    /// replacement.
    pub fn validate(&mut self) -> Result<Vec<String>> {
        let mut notes = Vec::new();
        let server = &mut self.server;

        if server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        if server.port == 0 {
            return Err(SettingsError::InvalidValue("server.port must be non-zero".into()));
        }
        if server.max_connections == 0 {
            server.max_connections = 1;
            notes.push("server.maxConnections raised to 1".to_string());
        }
        if server.outbound_buffer == 0 {
            server.outbound_buffer = 1;
            notes.push("server.outboundBuffer raised to 1".to_string());
        }
        if server.max_message_size < MIN_MESSAGE_SIZE {
            server.max_message_size = MIN_MESSAGE_SIZE;
            notes.push(format!("server.maxMessageSize raised to {MIN_MESSAGE_SIZE}"));
        }
        if server.heartbeat_interval_ms < MIN_HEARTBEAT_INTERVAL_MS {
            server.heartbeat_interval_ms = MIN_HEARTBEAT_INTERVAL_MS;
            notes.push(format!(
                "server.heartbeatIntervalMs raised to {MIN_HEARTBEAT_INTERVAL_MS}"
            ));
        }
        if server.heartbeat_timeout_ms <= server.heartbeat_interval_ms {
            server.heartbeat_timeout_ms = server.heartbeat_interval_ms * 2;
            notes.push(format!(
                "server.heartbeatTimeoutMs raised to {}",
                server.heartbeat_timeout_ms
            ));
        }

        let registry = &mut self.registry;
        if registry.sentinel_identity.trim().is_empty() {
            registry.sentinel_identity = RegistrySettings::default().sentinel_identity;
            notes.push("registry.sentinelIdentity reset to default".to_string());
        }
        if registry.display_name_template.trim().is_empty() {
            registry.display_name_template = RegistrySettings::default().display_name_template;
            notes.push("registry.displayNameTemplate reset to default".to_string());
        }

        for note in &notes {
            warn!(correction = %note, "settings corrected");
        }
        Ok(notes)
    }
}
