//! WebSocket upgrade and per-connection sessions.

pub mod limit;
pub mod session;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::warn;

use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::server::AppState;

/// GET /ws
///
/// Reserves a connection slot before accepting the upgrade and refuses with
/// 503 once `max_connections` slots are taken. The slot is held for the
/// life of the session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = state.slots.try_acquire() else {
        warn!(limit = state.slots.limit(), "connection limit reached, refusing upgrade");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };
    let conn_id = uuid::Uuid::now_v7().to_string();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            session::run_ws_session(socket, conn_id, state).await;
            drop(slot);
        })
}
