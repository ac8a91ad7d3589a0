//! Response observation for the metrics stage.

use axum::body::HttpBody;
use axum::http::{Response, StatusCode};

/// Status and body size of a finished response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseObservation {
    pub status: StatusCode,
    pub bytes: u64,
}

impl Default for ResponseObservation {
    /// A handler that writes nothing answers `200 OK` with an empty body.
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            bytes: 0,
        }
    }
}

impl ResponseObservation {
    /// Observe a response without consuming its body.
    ///
    /// Byte counts come from the body's size hint: exact for buffered bodies,
    /// the lower bound for streaming ones.
    pub fn observe<B: HttpBody>(response: &Response<B>) -> Self {
        let hint = response.body().size_hint();
        Self {
            status: response.status(),
            bytes: hint.exact().unwrap_or_else(|| hint.lower()),
        }
    }

    /// Status code as a metric label.
    pub fn status_label(&self) -> String {
        self.status.as_u16().to_string()
    }
}
