//! `RelayServer`: Axum HTTP + WebSocket server around the relay core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use callrelay_core::{EventRouter, IdentityRegistry, LifecycleManager, RegistryFanout};
use callrelay_settings::RegistrySettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;
use crate::websocket::limit::ConnectionSlots;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection lifecycle manager.
    pub lifecycle: Arc<LifecycleManager>,
    /// Event router.
    pub router: Arc<EventRouter>,
    /// Identity registry.
    pub registry: Arc<IdentityRegistry>,
    /// Transport configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// WebSocket connection slots (`max_connections`).
    pub slots: Arc<ConnectionSlots>,
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Wire the core components together.
    pub fn new(
        config: ServerConfig,
        registry_settings: &RegistrySettings,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(IdentityRegistry::new(
            registry_settings.sentinel_identity.clone(),
        ));
        let notifier = Arc::new(RegistryFanout::new(Arc::clone(&registry)));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&registry),
            notifier,
            registry_settings.registration_defaults(),
        ));
        let router = Arc::new(EventRouter::new(Arc::clone(&registry)));
        let slots = Arc::new(ConnectionSlots::new(config.max_connections));
        Self {
            state: AppState {
                lifecycle,
                router,
                registry,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
                slots,
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(websocket::ws_handler))
            .merge(routes::api_routes())
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();
        let lifecycle = Arc::clone(&self.state.lifecycle);

        info!(%addr, "call relay listening");
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    token.cancelled().await;
                    lifecycle.close_all();
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the identity registry.
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.state.registry
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.lifecycle.connection_count(),
        state.registry.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(
            ServerConfig::default(),
            &RegistrySettings::default(),
            PrometheusBuilder::new().build_recorder().handle(),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, parsed) = get_json(make_server().router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["registered"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_is_text() {
        let app = make_server().router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn ws_endpoint_requires_upgrade() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn sentinel_comes_from_settings() {
        let settings = RegistrySettings {
            sentinel_identity: "svc".into(),
            ..RegistrySettings::default()
        };
        let server = RelayServer::new(
            ServerConfig::default(),
            &settings,
            PrometheusBuilder::new().build_recorder().handle(),
        );
        assert_eq!(server.registry().sentinel(), "svc");
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.shutdown().drain(handle, None).await);
    }
}
