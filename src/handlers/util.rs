//! Shared utilities for handlers.

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::error::{AppError, AppResult};

/// Serialize `value` as a JSON response with the given status.
///
/// Encoding failures are logged with `context` and surface as a generic 500.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T, context: &str) -> AppResult<Response> {
    let body = serde_json::to_vec(value).map_err(|e| {
        error!(error = %e, context, "Failed to encode JSON response");
        AppError::from(e)
    })?;

    Ok((status, [(CONTENT_TYPE, "application/json")], body).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use serde::ser::Error as _;

    use super::*;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("boom"))
        }
    }

    #[test]
    fn test_json_response_sets_content_type() {
        let body = HashMap::from([("status", "up")]);
        let response = json_response(StatusCode::OK, &body, "test").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_encoding_failure_is_generic_500() {
        let err = json_response(StatusCode::OK, &Unencodable, "test").unwrap_err();
        assert!(matches!(err, AppError::SerializationError(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
