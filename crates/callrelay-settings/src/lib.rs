//! # callrelay-settings
//!
//! Configuration management with layered sources for the call relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **User file**: `~/.callrelay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CALLRELAY_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.
//!
//! ## Crate Position
//!
//! Depends on: callrelay-core. Depended on by: callrelay-server, callrelay.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_with_env, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = RelaySettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_match_documented_values() {
        let settings = RelaySettings::default();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.max_connections, 1024);
        assert_eq!(settings.registry.sentinel_identity, "service");
        assert_eq!(settings.logging.level, "info");
    }
}
