//! Log level and format.

use callrelay_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_format_from_file() {
        let s: LoggingSettings = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(s.format, LogFormat::Json);
        assert_eq!(s.level, "info");
    }
}
