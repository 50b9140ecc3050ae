//! # callrelay
//!
//! Call relay server binary: loads settings, starts logging and metrics,
//! then serves the HTTP event API and the `WebSocket` gateway until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use callrelay_core::logging::{self, LogFormat};
use callrelay_server::config::ServerConfig;
use callrelay_server::server::RelayServer;
use callrelay_settings::RelaySettings;
use clap::Parser;

/// Call relay server.
#[derive(Parser, Debug)]
#[command(name = "callrelay", about = "Identity-addressed call event relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.callrelay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Layer command-line flags over the loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(callrelay_settings::settings_path);
    let mut settings = callrelay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    logging::init_subscriber(&settings.logging.level, settings.logging.format)
        .context("Failed to initialize logging")?;
    // After logging init so each correction is logged by validate().
    let corrections = settings.validate().context("Invalid settings")?;
    if !corrections.is_empty() {
        tracing::info!(count = corrections.len(), "settings corrected at startup");
    }

    let metrics = callrelay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let server = RelayServer::new(config, &settings.registry, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        sentinel = %settings.registry.sentinel_identity,
        "call relay listening on http://{addr} (ws://{addr}/ws)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().drain(handle, None).await {
        tracing::warn!("forced shutdown after drain timeout");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["callrelay"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn cli_overrides_host_and_port() {
        let cli = Cli::parse_from(["callrelay", "--host", "127.0.0.1", "--port", "8080"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn cli_logging_flags() {
        let cli = Cli::parse_from(["callrelay", "--log-level", "debug", "--json-logs"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn cli_port_is_validated_with_file_values() {
        let cli = Cli::parse_from(["callrelay", "--port", "0"]);
        let mut settings = RelaySettings::default();
        settings.server.heartbeat_interval_ms = 10;
        cli.apply(&mut settings);
        assert!(settings.validate().is_err());

        let cli = Cli::parse_from(["callrelay", "--port", "8080"]);
        cli.apply(&mut settings);
        let notes = settings.validate().unwrap();
        assert!(notes.iter().any(|n| n.starts_with("server.heartbeatIntervalMs")));
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["callrelay", "--settings", "/tmp/relay.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/relay.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["callrelay", "--port", "70000"]).is_err());
    }
}
