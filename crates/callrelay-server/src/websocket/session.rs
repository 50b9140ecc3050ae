//! WebSocket session: one task per connection from upgrade through close.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use callrelay_core::ClientConnection;
use callrelay_core::envelope::{ClientFrame, ClientFrameKind};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::server::AppState;

/// Run a WebSocket session for a connected client.
///
/// 1. Tracks the connection with the lifecycle manager
/// 2. Forwards queued frames and sends periodic Pings from a writer task
/// 3. Dispatches inbound text (and UTF-8 binary) frames
/// 4. Ends on Close, read error, close request or server shutdown
/// 5. Closes the connection with the lifecycle manager exactly once
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(ws: WebSocket, conn_id: String, state: AppState) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(state.config.outbound_buffer);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));
    let started = Instant::now();

    state.lifecycle.connect(Arc::clone(&connection));
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound = tokio::spawn(run_outbound(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        state.config.heartbeat_interval,
        state.config.heartbeat_timeout,
    ));
    let shutdown = state.shutdown.token();

    loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            () = connection.closed() => {
                info!("close requested");
                break;
            }
            () = shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "read error");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        match msg {
            Message::Text(text) => handle_frame(&state, &conn_id, text.as_str()),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_frame(&state, &conn_id, text),
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
        }
    }

    let _ = state.lifecycle.close(&conn_id);
    outbound.abort();
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

/// Dispatch one inbound text frame.
fn handle_frame(state: &AppState, conn_id: &str, text: &str) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable frame");
            return;
        }
    };
    match frame.kind() {
        Some(ClientFrameKind::Register) => {
            let _ = state.lifecycle.register_message(conn_id, frame.data);
        }
        None => debug!(kind = %frame.kind, "ignoring unknown frame type"),
    }
}

/// Writer task: forwards queued frames and pings the client.
///
/// Requests close on a failed write or when the client has been silent
/// for longer than `timeout`.
async fn run_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ping_interval = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else { break };
                if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                    warn!(conn_id = %connection.id, "socket write failed");
                    connection.request_close();
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if heartbeat_expired(&connection, timeout) {
                    warn!(conn_id = %connection.id, ?timeout, "client unresponsive, closing");
                    connection.request_close();
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    connection.request_close();
                    break;
                }
            }
        }
    }
}

/// Whether the client missed the last ping cycle and has been silent past `timeout`.
fn heartbeat_expired(connection: &ClientConnection, timeout: Duration) -> bool {
    !connection.check_alive() && connection.last_pong_elapsed() > timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use callrelay_core::ConnectionState;
    use callrelay_settings::RegistrySettings;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;

    use crate::config::ServerConfig;
    use crate::server::RelayServer;

    fn make_state() -> AppState {
        RelayServer::new(
            ServerConfig::default(),
            &RegistrySettings::default(),
            PrometheusBuilder::new().build_recorder().handle(),
        )
        .state()
        .clone()
    }

    fn open(state: &AppState, id: &str) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(16);
        state
            .lifecycle
            .connect(Arc::new(ClientConnection::new(id.into(), tx)));
        rx
    }

    #[test]
    fn register_frame_registers() {
        let state = make_state();
        let mut rx = open(&state, "c1");
        handle_frame(
            &state,
            "c1",
            r#"{"type":"registerAgent","data":{"agentId":"A","agentNumber":"+1000"}}"#,
        );
        assert_eq!(
            state.lifecycle.state("c1"),
            ConnectionState::Registered {
                external_id: "A".into()
            }
        );
        let ack: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(ack["type"], "registrationSuccess");
    }

    #[test]
    fn bad_register_data_gets_error_reply() {
        let state = make_state();
        let mut rx = open(&state, "c1");
        handle_frame(&state, "c1", r#"{"type":"register","data":{"externalId":"A"}}"#);
        let reply: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(reply["type"], "registrationError");
        assert_eq!(reply["data"]["field"], "identity");
        assert_eq!(state.lifecycle.state("c1"), ConnectionState::Connected);
    }

    #[test]
    fn garbage_and_unknown_frames_are_ignored() {
        let state = make_state();
        let mut rx = open(&state, "c1");
        handle_frame(&state, "c1", "not json");
        handle_frame(&state, "c1", r#"{"type":"subscribe","data":{}}"#);
        assert!(rx.try_recv().is_err());
        assert_eq!(state.lifecycle.state("c1"), ConnectionState::Connected);
    }

    #[test]
    fn heartbeat_not_expired_while_alive() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("hb".into(), tx);
        assert!(!heartbeat_expired(&conn, Duration::ZERO));
    }

    #[test]
    fn heartbeat_expires_after_silent_cycle() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("hb".into(), tx);
        let _ = conn.check_alive();
        std::thread::sleep(Duration::from_millis(5));
        assert!(heartbeat_expired(&conn, Duration::from_millis(1)));
        conn.mark_alive();
        assert!(!heartbeat_expired(&conn, Duration::from_millis(1)));
    }
}
