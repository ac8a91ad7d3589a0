//! Health endpoints.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Database health map
//! - `GET /api/v1/auth/health` - Authentication subsystem health
//!
//! Both always answer 200; degradation is reported in the body.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use super::util::json_response;
use crate::database::{STATUS_KEY, STATUS_UP};
use crate::error::AppResult;
use crate::state::AppState;

/// Identity providers reported as components of the auth subsystem.
pub const AUTH_PROVIDERS: [&str; 2] = ["google_oauth", "microsoft_oauth"];

/// Overall status when a component is down.
pub const STATUS_DEGRADED: &str = "degraded";

/// Response body of `GET /api/v1/auth/health`.
#[derive(Debug, Serialize)]
pub struct AuthHealthResponse {
    /// `up` or `degraded`
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub components: HashMap<&'static str, HashMap<String, String>>,
}

/// Database health check.
///
/// # Response Body
///
/// ```json
/// { "status": "up", "database": "memory" }
/// ```
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> AppResult<Response> {
    json_response(StatusCode::OK, &state.db.health(), "health")
}

/// Authentication subsystem health check.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "up",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "version": "0.1.0",
///   "components": {
///     "database": { "status": "up", "database": "memory" },
///     "google_oauth": { "status": "up" },
///     "microsoft_oauth": { "status": "up" }
///   }
/// }
/// ```
///
/// `status` is `degraded` whenever the database is not up.
#[instrument(skip(state))]
pub async fn auth_health(State(state): State<AppState>) -> AppResult<Response> {
    let database = state.db.health();
    let status = match database.get(STATUS_KEY).map(String::as_str) {
        Some(STATUS_UP) => STATUS_UP,
        db_status => {
            warn!(db_status = ?db_status, "Auth health degraded: database not up");
            STATUS_DEGRADED
        }
    };

    let mut components = HashMap::from([("database", database)]);
    for provider in AUTH_PROVIDERS {
        components.insert(
            provider,
            HashMap::from([(STATUS_KEY.to_string(), STATUS_UP.to_string())]),
        );
    }

    let body = AuthHealthResponse {
        status,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        components,
    };

    json_response(StatusCode::OK, &body, "auth_health")
}
