use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use leaderboard_engine::LeaderboardService;

use crate::auth::{Authenticator, HeaderAuthenticator};
use crate::client;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handlers;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LeaderboardService>,
    pub auth: Arc<dyn Authenticator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(service: Arc<LeaderboardService>, config: ServerConfig) -> Self {
        Self {
            service,
            auth: Arc::new(HeaderAuthenticator),
            config: Arc::new(config),
        }
    }

    pub fn with_authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = auth;
        self
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout;
    let api = Router::new()
        .route("/api/scores", post(handlers::submit_score))
        .route("/api/leaderboard", get(handlers::leaderboard))
        .route("/api/stats", get(handlers::stats))
        .route("/api/metrics", get(handlers::metrics))
        .route("/api/admin/broadcast", post(handlers::admin_broadcast))
        .route("/health", get(handlers::health))
        .layer(TimeoutLayer::new(timeout));

    Router::new()
        .route("/ws", get(ws_handler))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle that keeps background tasks
/// alive and can shut the server down.
pub async fn start(
    config: ServerConfig,
    service: Arc<LeaderboardService>,
) -> Result<ServerHandle, ServerError> {
    start_with_state(AppState::new(service, config)).await
}

pub async fn start_with_state(state: AppState) -> Result<ServerHandle, ServerError> {
    let config = Arc::clone(&state.config);

    let reaper = client::start_reaper_task(
        Arc::clone(&state.service),
        config.reap_interval,
        config.client_timeout,
    );

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Leaderboard server started");

    let router = build_router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        server,
        reaper,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running
/// until the runtime stops.
pub struct ServerHandle {
    pub port: u16,
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
    reaper: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.reaper.abort();
        if let Err(e) = (&mut self.server).await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
        tracing::info!("Leaderboard server stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, rx) = state.service.on_connect();
    tracing::info!(connection_id = %connection_id, "WebSocket client connected");

    client::handle_ws_connection(
        socket,
        connection_id,
        rx,
        state.service,
        state.config.heartbeat_interval,
    )
    .await;
}
