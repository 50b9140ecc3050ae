//! Metric names recorded by the core.
//!
//! The server describes these and renders them at `/metrics`.

/// Registration attempts (counter, labels: outcome).
pub const RELAY_REGISTRATIONS_TOTAL: &str = "relay_registrations_total";
/// Live registry entries (gauge).
pub const RELAY_REGISTERED_ENTRIES: &str = "relay_registered_entries";
/// Events routed (counter, labels: `event_type`, target).
pub const RELAY_EVENTS_ROUTED_TOTAL: &str = "relay_events_routed_total";
/// Frames queued to connections (counter, labels: `event_type`, kind).
pub const RELAY_DELIVERIES_TOTAL: &str = "relay_deliveries_total";
/// Requested identifiers with no live entry (counter, labels: `event_type`).
pub const RELAY_TARGETS_NOT_FOUND_TOTAL: &str = "relay_targets_not_found_total";
/// Frames rejected by a full or closed outbound queue (counter, labels: `event_type`).
pub const RELAY_DELIVERY_DROPS_TOTAL: &str = "relay_delivery_drops_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_metrics_are_recorded_under_these_names() {
        use crate::registry::test_support::{connection, registration};
        use crate::router::EventRouter;
        use crate::types::{ConnectionClass, RoutingTarget};
        use metrics_exporter_prometheus::PrometheusBuilder;
        use std::sync::Arc;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let registry = Arc::new(crate::IdentityRegistry::new("service"));
            let (conn, _rx) = connection("c1");
            let _ = registry
                .register(registration("A", "+1000", ConnectionClass::Generic), conn)
                .unwrap();
            let router = EventRouter::new(registry);
            let _ = router
                .deliver("incomingCall", &RoutingTarget::Broadcast, &serde_json::json!({}))
                .unwrap();
        });
        let output = handle.render();
        for expected in [
            RELAY_EVENTS_ROUTED_TOTAL,
            RELAY_DELIVERIES_TOTAL,
            RELAY_TARGETS_NOT_FOUND_TOTAL,
            RELAY_DELIVERY_DROPS_TOTAL,
        ] {
            assert!(output.contains(expected), "{expected} not recorded");
        }
    }
}
