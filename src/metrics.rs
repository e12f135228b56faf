//! Prometheus metrics for the gateway.
//!
//! Metrics are exposed via a dedicated HTTP listener (`METRICS_PORT`, 0 disables).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_authz_decisions_total` - Authorization outcomes (label: outcome)
//! - `gateway_audit_records_total` - Audit records emitted (label: outcome)
//! - `gateway_audit_truncated_total` - Response captures cut at the size cap
//! - `gateway_claims_decode_failures_total` - Bearer payloads that failed to decode
//!
//! ## Histograms
//! - `gateway_exchange_duration_seconds` - Audited exchange duration (labels: method, status)
//!
//! ## Gauges
//! - `gateway_store_status` - Token/role store connectivity (1 = up, 0 = down)
//!
//! Without an installed recorder every call below is a no-op, so tests and
//! embedders need no setup.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTHZ_DECISIONS_TOTAL: &str = "gateway_authz_decisions_total";
    pub const AUDIT_RECORDS_TOTAL: &str = "gateway_audit_records_total";
    pub const AUDIT_TRUNCATED_TOTAL: &str = "gateway_audit_truncated_total";
    pub const CLAIMS_DECODE_FAILURES_TOTAL: &str = "gateway_claims_decode_failures_total";
    pub const EXCHANGE_DURATION_SECONDS: &str = "gateway_exchange_duration_seconds";
    pub const STORE_STATUS: &str = "gateway_store_status";
}

/// Install the Prometheus exporter and describe every metric.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::AUTHZ_DECISIONS_TOTAL,
        "Authorization decisions by outcome"
    );
    describe_counter!(
        names::AUDIT_RECORDS_TOTAL,
        "Audit records emitted by outcome"
    );
    describe_counter!(
        names::AUDIT_TRUNCATED_TOTAL,
        "Response bodies whose audit capture hit the size cap"
    );
    describe_counter!(
        names::CLAIMS_DECODE_FAILURES_TOTAL,
        "Bearer tokens whose payload could not be decoded"
    );
    describe_histogram!(
        names::EXCHANGE_DURATION_SECONDS,
        "Audited exchange duration in seconds"
    );
    describe_gauge!(
        names::STORE_STATUS,
        "Token/role store connectivity (1 = up, 0 = down)"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

pub fn record_authz_decision(outcome: &'static str) {
    counter!(names::AUTHZ_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_audit_emitted(outcome: &'static str) {
    counter!(names::AUDIT_RECORDS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_audit_truncated() {
    counter!(names::AUDIT_TRUNCATED_TOTAL).increment(1);
}

pub fn record_claims_decode_failure() {
    counter!(names::CLAIMS_DECODE_FAILURES_TOTAL).increment(1);
}

/// Record how long an audited exchange took, from request to response head.
pub fn record_exchange_duration(method: &str, status: Option<u16>, duration_ms: i64) {
    let status = status.map_or_else(|| "none".to_string(), |s| s.to_string());
    histogram!(
        names::EXCHANGE_DURATION_SECONDS,
        "method" => method.to_string(),
        "status" => status
    )
    .record(duration_ms.max(0) as f64 / 1000.0);
}

pub fn set_store_status(up: bool) {
    gauge!(names::STORE_STATUS).set(if up { 1.0 } else { 0.0 });
}
