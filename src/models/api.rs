use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the token store is unreachable
    pub status: String,
    /// Result of the last store connectivity check
    pub store_connected: bool,
    /// Number of configured upstream routes
    pub routes: usize,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
