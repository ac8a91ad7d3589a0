//! Session endpoints and the catch-all fallback.

use axum::http::{StatusCode, Uri};
use axum::response::Response;
use serde_json::json;
use tracing::{info, instrument};

use super::util::json_response;
use crate::error::{AppError, AppResult};

/// End the caller's session.
///
/// Session storage lives with the token issuer; this endpoint only
/// acknowledges the logout so the audit stage can record it.
///
/// # Response Body
///
/// ```json
/// { "status": "logged_out" }
/// ```
#[instrument]
pub async fn logout() -> AppResult<Response> {
    info!("Logout acknowledged");
    json_response(StatusCode::OK, &json!({ "status": "logged_out" }), "logout")
}

/// Fallback for unmatched paths.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
