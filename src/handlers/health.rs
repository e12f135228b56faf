//! Health and readiness endpoints.
//!
//! - **Health** (`/health`): always 200, reports the last store check
//! - **Readiness** (`/ready`): pings the store now, 503 if it is unreachable
//!
//! Both paths are on the default authorization whitelist.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "healthy",
///   "store_connected": true,
///   "routes": 2,
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_connected = state.store_connected();

    Json(HealthResponse {
        status: if store_connected { "healthy" } else { "degraded" }.to_string(),
        store_connected,
        routes: state.config.routes.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.check_store().await {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
