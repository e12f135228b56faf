//! # gateway_guard
//!
//! Authorization and audit stages for an HTTP API gateway, built on Axum and
//! Tower:
//!
//! - **Token authorization**: opaque bearer tokens resolved against Redis,
//!   role checks per exact request path, caller classification
//! - **Request audit**: one structured access record per exchange with
//!   request/response bodies, timing and caller identity, without altering
//!   the bytes either side sees
//! - **Host harness**: static prefix routes and a streaming upstream forwarder
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Trace → Route Selection → Authorization → Audit            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, ready) / Forwarder (reqwest, streaming)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TokenStore + RoleStore (Redis or in-memory)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gateway_guard::audit::TracingSink;
//! use gateway_guard::store::RedisStore;
//! use gateway_guard::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = RedisStore::connect(
//!         &config.redis_url,
//!         config.token_key_prefix.clone(),
//!         config.resource_roles_key.clone(),
//!     )
//!     .await?;
//!
//!     let state = AppState::new(config, Arc::new(store), Arc::new(TracingSink))?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Embedding the stages
//!
//! The layers work on any `Router`:
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/api/orders", post(create_order))
//!     .layer(AuditLayer::new(Arc::new(TracingSink)))
//!     .layer(AuthorizationLayer::new(engine));
//! ```

pub mod audit;
pub mod authz;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
