//! Event router: resolves a [`RoutingTarget`] against one registry snapshot,
//! shapes the payload per connection class and shadow-delivers directed
//! events to logging sinks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::envelope::{Envelope, ServerEvent};
use crate::errors::RouterError;
use crate::registry::{IdentityRegistry, RegistryEntry};
use crate::report::DeliveryResult;
use crate::shaping::{ShadowTag, mobile_payload, shadow_payload};
use crate::telemetry::{
    RELAY_DELIVERIES_TOTAL, RELAY_DELIVERY_DROPS_TOTAL, RELAY_EVENTS_ROUTED_TOTAL,
    RELAY_TARGETS_NOT_FOUND_TOTAL,
};
use crate::types::{ConnectionClass, EventType, RoutingTarget};

/// Lifetime drop count at which a connection is asked to close.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// Routes call events to registered connections.
pub struct EventRouter {
    registry: Arc<IdentityRegistry>,
}

/// Entries a target resolved to.
struct Resolution<'a> {
    matched: Vec<&'a RegistryEntry>,
    not_found: Vec<String>,
    considered: usize,
    tag: ShadowTag,
}

impl EventRouter {
    /// Route over `registry`.
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver an event named by its wire string.
    ///
    /// Unknown event types are rejected before the registry is read.
    pub fn deliver(
        &self,
        event_type: &str,
        target: &RoutingTarget,
        payload: &Value,
    ) -> Result<DeliveryResult, RouterError> {
        let event_type: EventType = event_type.parse()?;
        Ok(self.deliver_event(event_type, target, payload))
    }

    /// Deliver `payload` to the entries `target` resolves to.
    ///
    /// Never waits on the transport: frames are queued and a full or closed
    /// queue is reported in `dropped`.
    #[instrument(skip(self, payload), fields(event_type = %event_type, target = target.kind()))]
    pub fn deliver_event(
        &self,
        event_type: EventType,
        target: &RoutingTarget,
        payload: &Value,
    ) -> DeliveryResult {
        let snapshot = self.registry.snapshot();
        let resolution = resolve(&snapshot, target, self.registry.sentinel());
        let mut result = DeliveryResult::new(event_type, resolution.considered);
        for requested in &resolution.not_found {
            result.record_not_found(requested);
        }

        let event = ServerEvent::Call(event_type);
        let raw_frame = frame(event, payload.clone());
        let mut mobile_frame = None;
        let mut shadow_frame = None;
        for entry in &resolution.matched {
            let message = match entry.class {
                ConnectionClass::Mobile => mobile_frame
                    .get_or_insert_with(|| frame(event, mobile_payload(event_type, payload)))
                    .clone(),
                // A sink addressed directly still sees the target annotation.
                ConnectionClass::LoggingSink if target.is_directed() => shadow_frame
                    .get_or_insert_with(|| frame(event, shadow_payload(payload, &resolution.tag)))
                    .clone(),
                _ => raw_frame.clone(),
            };
            let accepted = send(entry, message);
            result.record_delivered(&entry.external_id, accepted);
        }

        if target.is_directed() {
            let primaries: HashSet<&str> = resolution
                .matched
                .iter()
                .map(|e| e.external_id.as_str())
                .collect();
            let sinks: Vec<&RegistryEntry> = snapshot
                .iter()
                .filter(|e| e.class == ConnectionClass::LoggingSink)
                .filter(|e| !primaries.contains(e.external_id.as_str()))
                .collect();
            if !sinks.is_empty() {
                let shadow_frame = shadow_frame
                    .get_or_insert_with(|| frame(event, shadow_payload(payload, &resolution.tag)))
                    .clone();
                for sink in sinks {
                    let accepted = send(sink, shadow_frame.clone());
                    result.record_shadow(&sink.external_id, accepted);
                }
            }
        }

        record_metrics(event_type, target, &result);
        debug!(
            delivered = result.delivered.len(),
            not_found = result.not_found.len(),
            shadow = result.shadow_delivered.len(),
            dropped = result.dropped.len(),
            "event routed"
        );
        result
    }
}

fn frame(event: ServerEvent, data: Value) -> Option<Arc<String>> {
    Envelope::new(event, data).to_json().map(Arc::new)
}

/// Queue a frame, asking persistently slow connections to close.
fn send(entry: &RegistryEntry, message: Option<Arc<String>>) -> bool {
    let connection = &entry.connection;
    let accepted = message.is_some_and(|m| connection.send(m));
    if !accepted {
        let drops = connection.drop_count();
        warn!(
            external_id = %entry.external_id,
            conn_id = %connection.id,
            drops,
            "outbound queue rejected event"
        );
        if drops >= MAX_TOTAL_DROPS && !connection.is_closing() {
            warn!(conn_id = %connection.id, drops, "closing slow connection");
            connection.request_close();
        }
    }
    accepted
}

fn resolve<'a>(snapshot: &'a [RegistryEntry], target: &RoutingTarget, sentinel: &str) -> Resolution<'a> {
    match target {
        RoutingTarget::Broadcast => Resolution {
            matched: snapshot.iter().collect(),
            not_found: Vec::new(),
            considered: snapshot.len(),
            tag: ShadowTag {
                target_identity: Value::Null,
                target_external_id: None,
            },
        },
        RoutingTarget::ByIdentity(identity) => {
            let mut resolution = by_identity(snapshot, std::slice::from_ref(identity), sentinel);
            resolution.tag.target_identity = json!(identity);
            resolution
        }
        RoutingTarget::ByIdentities(identities) => by_identity(snapshot, identities, sentinel),
        RoutingTarget::ByExternalId(external_id) => {
            let mut resolution = by_external_id(snapshot, std::slice::from_ref(external_id));
            resolution.tag = ShadowTag {
                target_identity: resolution
                    .matched
                    .first()
                    .map_or(Value::Null, |e| json!(e.identity)),
                target_external_id: Some(json!(external_id)),
            };
            resolution
        }
        RoutingTarget::ByExternalIds(external_ids) => by_external_id(snapshot, external_ids),
    }
}

fn by_identity<'a>(snapshot: &'a [RegistryEntry], requested: &[String], sentinel: &str) -> Resolution<'a> {
    let index: HashMap<&str, &RegistryEntry> = snapshot
        .iter()
        .filter(|e| e.identity != sentinel)
        .map(|e| (e.identity.as_str(), e))
        .collect();
    let requested: IndexSet<&str> = requested.iter().map(String::as_str).collect();
    let mut resolution = Resolution {
        matched: Vec::new(),
        not_found: Vec::new(),
        considered: requested.len(),
        tag: ShadowTag {
            target_identity: json!(requested.iter().collect::<Vec<_>>()),
            target_external_id: None,
        },
    };
    for identity in requested {
        match index.get(identity) {
            Some(entry) => resolution.matched.push(*entry),
            None => resolution.not_found.push(identity.to_string()),
        }
    }
    resolution
}

fn by_external_id<'a>(snapshot: &'a [RegistryEntry], requested: &[String]) -> Resolution<'a> {
    let index: HashMap<&str, &RegistryEntry> = snapshot
        .iter()
        .map(|e| (e.external_id.as_str(), e))
        .collect();
    let requested: IndexSet<&str> = requested.iter().map(String::as_str).collect();
    let mut matched = Vec::new();
    let mut not_found = Vec::new();
    for external_id in &requested {
        match index.get(external_id) {
            Some(entry) => matched.push(*entry),
            None => not_found.push((*external_id).to_string()),
        }
    }
    let identities: Vec<&str> = matched.iter().map(|e| e.identity.as_str()).collect();
    Resolution {
        considered: requested.len(),
        tag: ShadowTag {
            target_identity: json!(identities),
            target_external_id: Some(json!(requested.iter().collect::<Vec<_>>())),
        },
        matched,
        not_found,
    }
}

fn record_metrics(event_type: EventType, target: &RoutingTarget, result: &DeliveryResult) {
    let event = event_type.as_str();
    metrics::counter!(RELAY_EVENTS_ROUTED_TOTAL, "event_type" => event, "target" => target.kind())
        .increment(1);
    metrics::counter!(RELAY_DELIVERIES_TOTAL, "event_type" => event, "kind" => "primary")
        .increment(result.delivered.len() as u64);
    metrics::counter!(RELAY_DELIVERIES_TOTAL, "event_type" => event, "kind" => "shadow")
        .increment(result.shadow_delivered.len() as u64);
    metrics::counter!(RELAY_TARGETS_NOT_FOUND_TOTAL, "event_type" => event)
        .increment(result.not_found.len() as u64);
    metrics::counter!(RELAY_DELIVERY_DROPS_TOTAL, "event_type" => event)
        .increment(result.dropped.len() as u64);
}
