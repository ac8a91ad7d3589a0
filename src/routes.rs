//! Application routing with the gatekeeping pipeline.
//!
//! # Routes
//!
//! - `GET /api/v1/health` - Database health (unauthenticated, never rate limited)
//! - `GET /api/v1/auth/health` - Authentication subsystem health (bearer token)
//! - `POST /api/v1/logout` - Logout acknowledgement (unauthenticated)
//! - anything else - 404 JSON error
//!
//! # Middleware Stack
//!
//! ```text
//! Request
//!    │
//!    ▼
//! Tracing → Logging → Metrics → Audit → CORS → Rate Limit → Auth Gate
//!    │
//!    ▼
//! Handler / fallback
//! ```
//!
//! The fallback is registered before the pipeline so unmatched paths pass
//! through every stage as well.

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/auth/health", get(handlers::auth_health))
        .route("/api/v1/logout", post(handlers::logout))
        .fallback(handlers::not_found);

    let pipeline = state.pipeline();
    let limits = state.limiter.config();
    info!(
        stages = ?pipeline.stages().iter().map(|s| s.name()).collect::<Vec<_>>(),
        ip_max = limits.ip_max_requests,
        ip_window_secs = limits.ip_window.as_secs(),
        service_max = limits.service_max_requests,
        service_window_secs = limits.service_window.as_secs(),
        "Middleware pipeline configured"
    );

    pipeline.apply(router).with_state(state)
}
