//! HTTP event API: turns requests into router calls and delivery results
//! into responses. Also serves registry listings.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use callrelay_core::{RouterError, RoutingTarget};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::server::AppState;

/// Body keys holding identity lists, canonical first.
const IDENTITY_LIST_KEYS: [&str; 2] = ["identities", "agentNumbers"];
/// Body keys holding external id lists, canonical first.
const EXTERNAL_ID_LIST_KEYS: [&str; 2] = ["externalIds", "agentIds"];

/// Routes under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(list_agents))
        .route("/api/agents/number/{identity}", get(agent_by_identity))
        .route("/api/agents/id/{external_id}", get(agent_by_external_id))
        .route("/api/{event_type}", post(broadcast_event))
        .route("/api/{event_type}/number/{identity}", post(identity_event))
        .route("/api/android/{event_type}/number/{identity}", post(identity_event))
        .route("/api/{event_type}/numbers", post(identities_event))
        .route("/api/{event_type}/agent/{external_id}", post(external_id_event))
        .route("/api/{event_type}/agents", post(external_ids_event))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

/// Read the request body as JSON. An empty body is an empty object.
fn parse_body(body: &Bytes) -> Result<Value, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "rejecting request with invalid JSON body");
        error_response(StatusCode::BAD_REQUEST, "Invalid JSON body")
    })
}

/// Take the first selector list found under `keys` out of the payload.
///
/// A missing or non-array list yields an empty selector; non-string items
/// are skipped.
fn take_selector(payload: &mut Value, keys: &[&str]) -> Vec<String> {
    let Some(object) = payload.as_object_mut() else {
        return Vec::new();
    };
    let mut selected = None;
    for key in keys {
        if let Some(value) = object.remove(*key) {
            if selected.is_none() {
                selected = Some(value);
            }
        }
    }
    match selected {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Route one event and map the result to an HTTP response.
#[instrument(skip(state, payload), fields(target = target.kind()))]
fn deliver(state: &AppState, event_type: &str, target: &RoutingTarget, payload: &Value) -> Response {
    let result = match state.router.deliver(event_type, target, payload) {
        Ok(result) => result,
        Err(RouterError::InvalidEventType(_)) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid event type");
        }
    };

    if !target.is_directed() && result.is_unreachable() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "No socket client connected");
    }

    let (status, outcome, message) = if result.is_unreachable() {
        (StatusCode::NOT_FOUND, "error", "Target not connected".to_string())
    } else {
        (StatusCode::OK, "success", result.summary())
    };
    info!(
        event_type,
        delivered = result.delivered.len(),
        not_found = result.not_found.len(),
        status = status.as_u16(),
        "event request handled"
    );

    let mut body = match serde_json::to_value(&result) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let _ = body.insert("status".into(), json!(outcome));
    let _ = body.insert("message".into(), json!(message));
    (status, Json(Value::Object(body))).into_response()
}

/// POST /api/{eventType}
async fn broadcast_event(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(payload) => deliver(&state, &event_type, &RoutingTarget::Broadcast, &payload),
        Err(resp) => resp,
    }
}

/// POST /api/{eventType}/number/{identity}
async fn identity_event(
    State(state): State<AppState>,
    Path((event_type, identity)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(payload) => deliver(&state, &event_type, &RoutingTarget::ByIdentity(identity), &payload),
        Err(resp) => resp,
    }
}

/// POST /api/{eventType}/numbers
async fn identities_event(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(mut payload) => {
            let identities = take_selector(&mut payload, &IDENTITY_LIST_KEYS);
            deliver(&state, &event_type, &RoutingTarget::ByIdentities(identities), &payload)
        }
        Err(resp) => resp,
    }
}

/// POST /api/{eventType}/agent/{externalId}
async fn external_id_event(
    State(state): State<AppState>,
    Path((event_type, external_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(payload) => deliver(
            &state,
            &event_type,
            &RoutingTarget::ByExternalId(external_id),
            &payload,
        ),
        Err(resp) => resp,
    }
}

/// POST /api/{eventType}/agents
async fn external_ids_event(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    body: Bytes,
) -> Response {
    match parse_body(&body) {
        Ok(mut payload) => {
            let external_ids = take_selector(&mut payload, &EXTERNAL_ID_LIST_KEYS);
            deliver(
                &state,
                &event_type,
                &RoutingTarget::ByExternalIds(external_ids),
                &payload,
            )
        }
        Err(resp) => resp,
    }
}

/// GET /api/agents
async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let agents: Vec<_> = state.registry.snapshot().iter().map(|e| e.summary()).collect();
    Json(json!({
        "status": "success",
        "totalAgents": agents.len(),
        "agents": agents,
    }))
}

/// GET /api/agents/number/{identity}
async fn agent_by_identity(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Response {
    match state.registry.lookup_by_identity(&identity) {
        Some(entry) => Json(json!({ "status": "success", "agent": entry.summary() })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Agent not found"),
    }
}

/// GET /api/agents/id/{externalId}
async fn agent_by_external_id(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Response {
    match state.registry.lookup_by_external_id(&external_id) {
        Some(entry) => Json(json!({ "status": "success", "agent": entry.summary() })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Agent not found"),
    }
}
