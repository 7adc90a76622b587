//! Dashboard HTTP server
//!
//! Serves the dashboard page, the websocket snapshot stream, health and
//! Prometheus metrics using Axum.

use crate::broadcast::Broadcaster;
use crate::error::BoardError;
use crate::metrics::{encode_metrics, MetricsCollector};
use crate::server::websocket::serve_subscriber;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::Snapshot;
use anyhow::Result;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const INDEX_HTML: &str = include_str!("../../static/index.html");
const DASHBOARD_JS: &str = include_str!("../../static/dashboard.js");

/// Dashboard server configuration
#[derive(Debug, Clone)]
pub struct DashboardServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for DashboardServerConfig {
    fn default() -> Self {
        Self {
            port: 51507,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the dashboard handlers
#[derive(Clone)]
pub struct DashboardState {
    pub service_name: String,
    pub broadcaster: Broadcaster<Snapshot>,
    pub metrics: Arc<MetricsCollector>,
    pub started_at: DateTime<Utc>,
    /// Cancelled when the server shuts down; every websocket subscription
    /// hangs off this token
    pub shutdown: CancellationToken,
}

/// HTTP server hosting the dashboard and its websocket endpoint
pub struct DashboardServer {
    config: DashboardServerConfig,
    state: DashboardState,
}

impl DashboardServer {
    /// Create a new dashboard server
    pub fn new(config: DashboardServerConfig, state: DashboardState) -> Self {
        Self { config, state }
    }

    /// Bind the configured address and serve until [`DashboardServer::stop`]
    pub async fn start(&self) -> Result<()> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| BoardError::InvalidAddress {
                address: address.clone(),
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BoardError::BindFailed {
                address,
                message: e.to_string(),
            })?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until [`DashboardServer::stop`]
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Dashboard listening on http://{}", listener.local_addr()?);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.create_router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Dashboard server shutdown signal received");
            })
            .await?;

        info!("Dashboard server stopped");
        Ok(())
    }

    /// Create the Axum router with all endpoints
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/static/dashboard.js", get(script_handler))
            .route("/connect", get(connect_handler))
            .route("/healthz", get(healthz_handler))
            .route("/stats", get(stats_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Stop the server and end every websocket subscription
    pub fn stop(&self) {
        info!("Stopping dashboard server...");
        self.state.shutdown.cancel();
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        DASHBOARD_JS,
    )
}

/// Upgrade to a websocket that streams the latest snapshot
async fn connect_handler(
    State(state): State<DashboardState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    debug!("Websocket subscriber connecting");
    ws.on_upgrade(move |socket| serve_subscriber(socket, state.broadcaster, state.shutdown))
}

/// Always-ready health check. Shutdown progress is reported by `/stats`.
async fn healthz_handler() -> &'static str {
    "ok"
}

/// Detailed service statistics (for debugging/human consumption)
async fn stats_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let health = HealthCheck::check(
        &state.service_name,
        state.started_at,
        &state.metrics,
        state.shutdown.is_cancelled(),
    );

    let status = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<DashboardState>) -> Response {
    match encode_metrics(&state.metrics) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}
