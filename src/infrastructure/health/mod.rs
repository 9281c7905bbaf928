//! Health Check Endpoint
//!
//! HTTP endpoint exposing the daemon's health snapshot. Used by container
//! orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health snapshot
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (checks the daemon is running)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::daemon::{DaemonHealth, DaemonStatus, TickerDaemon};

// =============================================================================
// Health Response
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Daemon version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Daemon health snapshot.
    #[serde(flatten)]
    pub daemon: DaemonHealth,
}

// =============================================================================
// Health Server
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    daemon: Arc<TickerDaemon>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, daemon: Arc<TickerDaemon>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            daemon,
        }
    }
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`HealthServerError`] if binding fails or the HTTP server
    /// fails while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let daemon = state.daemon.get_health().await;
    let status_code = match daemon.status {
        DaemonStatus::Running | DaemonStatus::Stopped => StatusCode::OK,
        DaemonStatus::Errored => StatusCode::SERVICE_UNAVAILABLE,
    };
    let response = HealthResponse {
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        daemon,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.daemon.is_running().await {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn health_response_flattens_daemon_snapshot() {
        let response = HealthResponse {
            version: "0.1.0".to_string(),
            uptime_secs: 5,
            current_time: Utc::now(),
            daemon: DaemonHealth {
                status: DaemonStatus::Running,
                running: true,
                daemon_process_id: None,
                collector_present: true,
                exchanges: vec!["kraken".to_string()],
                active_subscriptions: 2,
                ticks_received: HashMap::new(),
            },
        };

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["running"], true);
        assert_eq!(value["collector_present"], true);
        assert_eq!(value["active_subscriptions"], 2);
        assert_eq!(value["exchanges"][0], "kraken");
        assert_eq!(value["version"], "0.1.0");
    }
}
