//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `CALLRELAY_*` environment variable overrides
//!
//! Values are not validated here. Callers apply their own overrides (CLI
//! flags) and then run [`RelaySettings::validate`] once logging is up, so the
//! corrections it reports are not lost.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use callrelay_core::logging::LogFormat;
use callrelay_core::types::ConnectionClass;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

/// Resolve the path to the settings file (`~/.callrelay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".callrelay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load from `path`, reading overrides through `env`.
pub fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CALLRELAY_*` overrides read through `env`.
///
/// Integers must parse and fall within range; anything else is ignored
/// with a warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut RelaySettings, env: impl Fn(&str) -> Option<String>) {
    let env = Env(env);

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CALLRELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_MAX_CONNECTIONS", |s| {
        parse_usize_range(s, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_HEARTBEAT_INTERVAL", |s| {
        parse_u64_range(s, 1_000, 600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_HEARTBEAT_TIMEOUT", |s| {
        parse_u64_range(s, 2_000, 3_600_000)
    }) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_MAX_MESSAGE_SIZE", |s| {
        parse_usize_range(s, 1024, 64 * 1024 * 1024)
    }) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_OUTBOUND_BUFFER", |s| {
        parse_usize_range(s, 1, 65_536)
    }) {
        settings.server.outbound_buffer = v;
    }

    // ── Registry ────────────────────────────────────────────────────
    if let Some(v) = env.string("CALLRELAY_SENTINEL_IDENTITY") {
        settings.registry.sentinel_identity = v;
    }
    if let Some(v) = env.string("CALLRELAY_DEFAULT_CLASS") {
        settings.registry.default_class = ConnectionClass::parse(&v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CALLRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("CALLRELAY_LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
    if env.parsed("CALLRELAY_JSON_LOGS", parse_bool) == Some(true) {
        settings.logging.format = LogFormat::Json;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let target = serde_json::json!({"items": [1, 2, 3], "a": {"nested": true}});
        let source = serde_json::json!({"items": [4], "a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
        assert_eq!(merged["a"], 42);
    }

    // ── load_with_env ───────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_with_env(Path::new("/nonexistent/settings.json"), no_env).unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 8088, "heartbeatTimeoutMs": null}, "registry": {"sentinelIdentity": "svc"}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 8088);
        assert_eq!(settings.server.heartbeat_timeout_ms, 60_000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.registry.sentinel_identity, "svc");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_with_env(&path, no_env).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();
        assert!(matches!(
            load_with_env(&path, no_env).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_leaves_corrections_to_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"heartbeatIntervalMs": 5000, "heartbeatTimeoutMs": 1000}}"#,
        )
        .unwrap();
        let mut settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.heartbeat_timeout_ms, 1000);

        let notes = settings.validate().unwrap();
        assert_eq!(notes, vec!["server.heartbeatTimeoutMs raised to 10000"]);
        assert_eq!(settings.server.heartbeat_timeout_ms, 10_000);
    }

    #[test]
    fn corrected_file_values_produce_notes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"heartbeatIntervalMs": 10, "maxConnections": 0}}"#,
        )
        .unwrap();
        let mut settings = load_with_env(&path, no_env).unwrap();
        let notes = settings.validate().unwrap();
        assert!(notes.iter().any(|n| n.starts_with("server.maxConnections")));
        assert!(notes.iter().any(|n| n.starts_with("server.heartbeatIntervalMs")));
        assert_eq!(settings.server.max_connections, 1);
    }

    #[test]
    fn invalid_port_surfaces_at_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 0}}"#).unwrap();
        let mut settings = load_with_env(&path, no_env).unwrap();
        assert!(settings.validate().is_err());
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 8088}}"#).unwrap();

        let settings = load_with_env(
            &path,
            env(&[
                ("CALLRELAY_PORT", "9000"),
                ("CALLRELAY_HOST", "127.0.0.1"),
                ("CALLRELAY_DEFAULT_CLASS", "mobile"),
                ("CALLRELAY_JSON_LOGS", "yes"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.registry.default_class, ConnectionClass::Mobile);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = RelaySettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("CALLRELAY_PORT", "0"),
                ("CALLRELAY_MAX_CONNECTIONS", "lots"),
                ("CALLRELAY_LOG_FORMAT", "xml"),
                ("CALLRELAY_HOST", ""),
            ]),
        );
        assert_eq!(settings, RelaySettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true));
        }
        for v in ["false", "0", "No", "OFF"] {
            assert_eq!(parse_bool(v), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("3000", 1, 65535), Some(3000));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("999", 1000, 2000), None);
        assert_eq!(parse_usize_range("42", 1, 100), Some(42));
        assert_eq!(parse_usize_range("-1", 1, 100), None);
    }

    #[test]
    fn settings_path_under_home() {
        assert!(settings_path().ends_with(".callrelay/settings.json"));
    }
}
