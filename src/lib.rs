//! # Gatekeeper
//!
//! Request gatekeeping pipeline for Axum services:
//!
//! - **Identity**: classifies callers as anonymous, API key or bearer token
//! - **Admission**: fixed-window rate limits per client address or service
//! - **Access**: bearer token gate for `/api/` routes
//! - **Observability**: trace ids, request ids, auth audit records, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Tracing → Logging → Metrics → Audit → CORS       │
//! │            → Rate Limit → Auth Gate)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, auth health, logout)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  IdentityClassifier · FixedWindowLimiter · DatabaseService  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatekeeper::{AppState, Config, IdentityClassifier, InMemoryDatabase, JwtVerifier, build_router};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let verifier = JwtVerifier::new(config.require_auth_secret()?)?;
//! let classifier = IdentityClassifier::new(Arc::new(verifier));
//!
//! let state = AppState::new(config, Arc::new(InMemoryDatabase::default()), classifier);
//! let app = build_router(state);
//! // Serve `app` with axum::serve...
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod utils;

// Re-exports for convenience
pub use auth::{AuthError, AuthInfo, AuthType, Claims, IdentityClassifier, JwtVerifier, TokenVerifier};
pub use config::{Config, LogFormat};
pub use database::{DatabaseError, DatabaseService, InMemoryDatabase};
pub use error::{AppError, AppResult};
pub use limiter::{FixedWindowLimiter, LimitClass, RateLimiterConfig};
pub use middleware::{PIPELINE_ORDER, Pipeline, Stage};
pub use routes::build_router;
pub use state::AppState;
