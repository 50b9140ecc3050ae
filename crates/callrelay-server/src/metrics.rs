//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

pub use callrelay_core::telemetry::{
    RELAY_DELIVERIES_TOTAL, RELAY_DELIVERY_DROPS_TOTAL, RELAY_EVENTS_ROUTED_TOTAL,
    RELAY_REGISTERED_ENTRIES, RELAY_REGISTRATIONS_TOTAL, RELAY_TARGETS_NOT_FOUND_TOTAL,
};

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// WebSocket upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

fn describe_metrics() {
    metrics::describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections opened");
    metrics::describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections closed");
    metrics::describe_counter!(
        WS_CONNECTIONS_REJECTED_TOTAL,
        "WebSocket upgrades refused at the connection limit"
    );
    metrics::describe_gauge!(WS_CONNECTIONS_ACTIVE, "Open WebSocket connections");
    metrics::describe_histogram!(
        WS_CONNECTION_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "WebSocket connection lifetime"
    );
    metrics::describe_counter!(RELAY_REGISTRATIONS_TOTAL, "Registration attempts by outcome");
    metrics::describe_gauge!(RELAY_REGISTERED_ENTRIES, "Live registry entries");
    metrics::describe_counter!(RELAY_EVENTS_ROUTED_TOTAL, "Events routed by type and target kind");
    metrics::describe_counter!(RELAY_DELIVERIES_TOTAL, "Frames queued to connections");
    metrics::describe_counter!(RELAY_TARGETS_NOT_FOUND_TOTAL, "Requested targets with no live entry");
    metrics::describe_counter!(RELAY_DELIVERY_DROPS_TOTAL, "Frames rejected by outbound queues");
}
