//! Gateway routing with the authorization and audit stages.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Route Selection  │ ← RouteTarget extension (longest prefix)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authorization   │ ← 401-in-200 / 403, client_id + client_type
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      Audit       │ ← x-request-id, one access record per exchange
//! └────────┬─────────┘
//!          ▼
//!   /health, /ready, or the upstream forwarder
//! ```

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::audit::{AuditExemption, AuditLayer};
use crate::authz::{AuthorizationEngine, AuthorizationLayer};
use crate::gateway::{self, RouteSelectionLayer, RouteTable};
use crate::handlers;
use crate::middleware::TrustedProxyConfig;
use crate::state::AppState;

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let engine = AuthorizationEngine::new(
        state.tokens.clone(),
        state.roles.clone(),
        config.authority_prefix.clone(),
    )
    .with_ignore_urls(&config.auth_ignore_urls);

    let audit = AuditLayer::new(state.sink.clone())
        .with_exemption(AuditExemption::new(
            config.audit_exempt_paths.clone(),
            config.audit_exempt_fragments.clone(),
        ))
        .with_trusted_proxies(TrustedProxyConfig::new(&config.trusted_proxies))
        .with_request_body_limit(config.max_request_body_size)
        .with_response_body_limit(config.audit_response_body_limit);

    let table = RouteTable::new(config.routes.clone());
    info!(
        routes = table.len(),
        ignore_urls = ?config.auth_ignore_urls,
        response_capture_limit = config.audit_response_body_limit,
        "Gateway stages configured"
    );

    // Applied bottom to top: the last layer runs first
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .fallback(gateway::forward)
        .layer(audit)
        .layer(AuthorizationLayer::new(engine))
        .layer(RouteSelectionLayer::new(table))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
