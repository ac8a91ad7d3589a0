use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use gatekeeper::config::LogFormat;
use gatekeeper::database::DatabaseService;
use gatekeeper::{
    AppState, Config, IdentityClassifier, InMemoryDatabase, JwtVerifier, build_router, metrics,
    telemetry, utils,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration is not loaded yet, so honour LOG_FORMAT directly
    telemetry::init_tracing(LogFormat::from_env(), "info");

    info!("Starting gatekeeper v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        ip_max = config.rate_limit_ip_max,
        service_max = config.rate_limit_service_max,
        trusted_proxies = config.trusted_proxies.len(),
        log_level = %config.log_level,
        log_format = ?config.log_format,
        "Configuration loaded"
    );

    // Token verification
    let verifier = config
        .require_auth_secret()
        .and_then(JwtVerifier::new)
        .map_err(|e| {
            error!("Token verifier unavailable: {e}");
            exitcode::CONFIG
        })?;
    let classifier = IdentityClassifier::new(Arc::new(verifier));

    // Database
    let db = Arc::new(InMemoryDatabase::default());
    db.check().map_err(|e| {
        error!("Database check failed: {e}");
        exitcode::UNAVAILABLE
    })?;

    // Metrics exporter
    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    } else {
        info!("Prometheus metrics disabled (METRICS_PORT=0)");
    }

    // Build application state and router
    let state = AppState::new(config.clone(), db, classifier);
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /api/v1/health       - Database health");
    info!("  GET  /api/v1/auth/health  - Auth subsystem health");
    info!("  POST /api/v1/logout       - Logout");

    // Connect info feeds the client address fallback of the rate limiter
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

    info!(uptime_secs = state.uptime_seconds(), "Server shutdown complete");
    Ok(())
}
