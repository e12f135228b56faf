//! Shared application state.
//!
//! Holds the stores behind the authorization engine, the audit sink, the
//! upstream HTTP client and the configuration. Cloned into every handler and
//! layer; everything inside is behind `Arc` or already cheap to clone.
//!
//! # Structured Concurrency
//!
//! A background task checks store connectivity at `HEALTH_CHECK_INTERVAL_SECS`.
//! It is tracked by a `TaskTracker` and stopped through a `CancellationToken`;
//! call `shutdown()` before exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::audit::AuditSink;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::store::{RoleStore, TokenStore};

/// Shared application state for the gateway.
///
/// ```rust,ignore
/// let store = Arc::new(RedisStore::connect(&config.redis_url, "auth:", "AUTH:RESOURCE_ROLES_MAP").await?);
/// let state = AppState::new(config, store, Arc::new(TracingSink))?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Bearer token lookups
    pub tokens: Arc<dyn TokenStore>,
    /// Path → required roles lookups
    pub roles: Arc<dyn RoleStore>,
    /// Destination of audit records
    pub sink: Arc<dyn AuditSink>,
    /// Client used by the forwarder
    pub http_client: reqwest::Client,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Outcome of the last store check
    store_connected: Arc<AtomicBool>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build the state around a store serving both tokens and roles, and
    /// start the store health task.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `AppError::ConfigError` if the upstream HTTP client cannot be built.
    pub fn new<S>(config: Config, store: Arc<S>, sink: Arc<dyn AuditSink>) -> AppResult<Self>
    where
        S: TokenStore + RoleStore,
    {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.upstream_timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        let tokens: Arc<dyn TokenStore> = store.clone();
        let roles: Arc<dyn RoleStore> = store;

        let state = Self {
            config: Arc::new(config),
            tokens,
            roles,
            sink,
            http_client,
            started_at: Instant::now(),
            store_connected: Arc::new(AtomicBool::new(true)),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_health_check_task();

        Ok(state)
    }

    /// Result of the most recent store check.
    pub fn store_connected(&self) -> bool {
        self.store_connected.load(Ordering::Relaxed)
    }

    /// Ping the token store now and remember the outcome.
    pub async fn check_store(&self) -> bool {
        check_store_impl(self.tokens.as_ref(), &self.store_connected).await
    }

    /// Spawn the background store health check.
    ///
    /// Logs on every transition between reachable and unreachable so outages
    /// show up before requests start failing.
    fn spawn_health_check_task(&self) {
        let tokens = Arc::clone(&self.tokens);
        let connected = Arc::clone(&self.store_connected);
        let interval_duration = self.config.health_check_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(interval_duration);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Store health task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        check_store_impl(tokens.as_ref(), &connected).await;
                    }
                }
            }

            debug!("Store health task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

async fn check_store_impl(tokens: &dyn TokenStore, connected: &AtomicBool) -> bool {
    let up = match tokens.ping().await {
        Ok(()) => {
            trace!("Health check: store OK");
            true
        }
        Err(e) => {
            if connected.load(Ordering::Relaxed) {
                warn!(error = %e, "Health check: store is unreachable");
            }
            false
        }
    };

    if up && !connected.load(Ordering::Relaxed) {
        info!("Health check: store reachable again");
    }

    connected.store(up, Ordering::Relaxed);
    metrics::set_store_status(up);
    up
}
