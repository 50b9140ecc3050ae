//! Delivery result reporting.

use serde::Serialize;

use crate::types::EventType;

/// Outcome of one `deliver` call.
///
/// `delivered` lists entries that matched the target, whether or not their
/// outbound queue accepted the frame; those that did not also appear in
/// `dropped`.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    /// Event type routed.
    pub event_type: Option<EventType>,
    /// External ids of matched entries, in resolution order.
    pub delivered: Vec<String>,
    /// Requested identifiers with no live entry.
    pub not_found: Vec<String>,
    /// Distinct identifiers requested (broadcast: live entries at resolution).
    pub total_targets_considered: usize,
    /// External ids of logging sinks that received a shadow copy.
    pub shadow_delivered: Vec<String>,
    /// External ids whose outbound queue rejected the frame.
    pub dropped: Vec<String>,
}

impl DeliveryResult {
    /// Start an empty result for `event_type`.
    pub fn new(event_type: EventType, total_targets_considered: usize) -> Self {
        Self {
            event_type: Some(event_type),
            total_targets_considered,
            ..Self::default()
        }
    }

    /// Record a primary match.
    pub fn record_delivered(&mut self, external_id: &str, accepted: bool) {
        self.delivered.push(external_id.to_string());
        if !accepted {
            self.dropped.push(external_id.to_string());
        }
    }

    /// Record a requested identifier with no live entry.
    pub fn record_not_found(&mut self, requested: &str) {
        self.not_found.push(requested.to_string());
    }

    /// Record a shadow copy to a logging sink.
    pub fn record_shadow(&mut self, external_id: &str, accepted: bool) {
        self.shadow_delivered.push(external_id.to_string());
        if !accepted {
            self.dropped.push(external_id.to_string());
        }
    }

    /// No primary target matched.
    pub fn is_unreachable(&self) -> bool {
        self.delivered.is_empty()
    }

    /// Human-readable summary for API responses.
    pub fn summary(&self) -> String {
        let event = self.event_type.map_or("event", EventType::as_str);
        let mut message = format!("{event} event sent to {} client(s)", self.delivered.len());
        if !self.shadow_delivered.is_empty() {
            message.push_str(&format!(
                " and {} logging sink(s)",
                self.shadow_delivered.len()
            ));
        }
        message
    }
}
