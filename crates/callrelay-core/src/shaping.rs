//! Payload shaping for routed events.
//!
//! Mobile clients get a reduced payload built by probing a fixed, ordered
//! list of locations in the raw payload. This is a compatibility shim over
//! the loosely structured bodies upstream telephony systems post, not a
//! schema: any probe may miss, and a miss yields `null`.
//!
//! Logging sinks get the raw payload annotated with the routing target.

use serde_json::{Map, Value, json};

use crate::types::EventType;

/// One probe location: object keys walked in order. An array met along the
/// way resolves to its first element.
type Path = &'static [&'static str];

const AGENT_PHONE: &[Path] = &[
    &["agent_details", "agent_number"],
    &["agentDetails", "agentNumber"],
];

const CUSTOMER_PHONE: &[Path] = &[
    &["call_details", "customer_number"],
    &["customer_details", "customer_number"],
    &["from"],
];

const LIVE_EVENT: &[Path] = &[&["live_event"], &["call_details", "live_event"]];

/// Build the mobile payload for `event_type`.
///
/// Shape: `{eventType, agentPhone, customerPhone, timestamp, liveEvent}`.
pub fn mobile_payload(event_type: EventType, raw: &Value) -> Value {
    json!({
        "eventType": event_type.as_str(),
        "agentPhone": first_match(raw, AGENT_PHONE),
        "customerPhone": first_match(raw, CUSTOMER_PHONE),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "liveEvent": first_match(raw, LIVE_EVENT),
    })
}

/// First rule that resolves to a non-empty scalar wins.
fn first_match(raw: &Value, rules: &[Path]) -> Option<String> {
    rules.iter().find_map(|path| probe(raw, path))
}

fn probe(raw: &Value, path: Path) -> Option<String> {
    let mut current = first_element(raw);
    for key in path {
        current = first_element(current.as_object()?.get(*key)?);
    }
    match current {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_element(value: &Value) -> &Value {
    match value {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    }
}

/// Routing annotation attached to shadow copies.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowTag {
    /// Value of `targetIdentity`.
    pub target_identity: Value,
    /// Value of `targetExternalId`, for external-id targets.
    pub target_external_id: Option<Value>,
}

/// Annotate the raw payload for a logging sink.
///
/// Objects gain the tag keys; anything else is wrapped as
/// `{"payload": raw, "targetIdentity": ...}`.
pub fn shadow_payload(raw: &Value, tag: &ShadowTag) -> Value {
    let mut object = match raw {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            let _ = map.insert("payload".into(), other.clone());
            map
        }
    };
    let _ = object.insert("targetIdentity".into(), tag.target_identity.clone());
    if let Some(external) = &tag.target_external_id {
        let _ = object.insert("targetExternalId".into(), external.clone());
    }
    Value::Object(object)
}
