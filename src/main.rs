use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gateway_guard::audit::TracingSink;
use gateway_guard::config::LogFormat;
use gateway_guard::store::RedisStore;
use gateway_guard::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Log format comes from config; errors are reported once logging is up
    let config = Config::from_env();
    init_tracing(config.as_ref().map_or(LogFormat::Pretty, |c| c.log_format));

    info!("Starting gateway_guard v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    info!("Connecting to Redis...");
    let store = RedisStore::connect(
        &config.redis_url,
        config.token_key_prefix.clone(),
        config.resource_roles_key.clone(),
    )
    .await
    .map_err(|e| {
        error!("Failed to connect to Redis: {e}");
        exitcode::UNAVAILABLE
    })?;
    info!("Successfully connected to Redis");

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(config, Arc::new(store), Arc::new(TracingSink)).map_err(|e| {
        error!("Failed to build application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Gateway listening on http://{addr}");

    // ConnectInfo feeds the caller IP fallback of audit records
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
