//! `TermbridgeServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::errors::{ServerError, describe};
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::{CommandSession, EchoSession, SessionHandler};
use crate::websocket::session::{SessionOptions, run_ws_session};
use crate::websocket::transport::AxumTransport;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Backend run for every session.
    pub handler: Arc<dyn SessionHandler>,
    /// Renders the `/metrics` body.
    pub metrics: PrometheusHandle,
    config: Arc<ServerConfig>,
    connections: Arc<AtomicUsize>,
}

/// Holds one of the `max_connections` slots until dropped.
struct ConnectionSlot {
    connections: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(connections: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self {
            connections: connections.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The main termbridge server.
pub struct TermbridgeServer {
    config: Arc<ServerConfig>,
    handler: Arc<dyn SessionHandler>,
    metrics: PrometheusHandle,
    shutdown: Arc<ShutdownCoordinator>,
    connections: Arc<AtomicUsize>,
    start_time: Instant,
}

impl TermbridgeServer {
    /// Create a new server running `handler` for every session.
    pub fn new(
        config: ServerConfig,
        handler: Arc<dyn SessionHandler>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            handler,
            metrics,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Create a server whose handler follows the configuration: a
    /// [`CommandSession`] when `command` is set, otherwise [`EchoSession`].
    pub fn from_config(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let handler: Arc<dyn SessionHandler> =
            match config.command.clone().and_then(CommandSession::new) {
                Some(command) => {
                    info!(program = command.program(), "sessions run a command");
                    Arc::new(command)
                }
                None => Arc::new(EchoSession),
            };
        Self::new(config, handler, metrics)
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            handler: self.handler.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            connections: self.connections.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the serve task. The task finishes once
    /// the shutdown token fires and in-flight HTTP requests complete.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(url = %describe(&local), "listening");
        Ok((local, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.load(Ordering::Acquire);
    let resp = health::health_check(
        state.start_time,
        connections,
        state.shutdown.is_shutting_down(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// GET /ws: upgrade and run a proxied session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let max = state.config.max_connections;
    let Some(slot) = ConnectionSlot::acquire(&state.connections, max) else {
        warn!(max_connections = max, "connection limit reached, rejecting upgrade");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let client_id = Uuid::now_v7().to_string();
    let cancel = state.shutdown.session_token();
    let options = SessionOptions {
        proxy: state.config.proxy.clone(),
        ping_interval: state.config.ping_interval(),
    };
    let shutdown = state.shutdown.clone();
    let handler = state.handler.clone();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            shutdown.track(async move {
                run_ws_session(AxumTransport::new(socket), client_id, handler, cancel, options)
                    .await;
                drop(slot);
            })
        })
}
