//! Prometheus metrics for application observability.
//!
//! Metrics are recorded through the `metrics` facade and exposed by the
//! Prometheus exporter on a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `errors_total` - Errors by type (e.g. `rate_limit_exceeded_ip`)
//!
//! ## Histograms
//! - `request_duration_seconds` - Request duration (labels: path, method, status)
//! - `response_size_bytes` - Response body size (labels: path, method, status)
//!
//! ## Gauges
//! - `active_sessions` - User sessions seen on authentication endpoints
//!
//! # Usage
//!
//! ```rust,ignore
//! use gatekeeper::metrics::{init_metrics, record_error, record_request_duration};
//!
//! init_metrics(addr)?;
//!
//! record_request_duration("/api/v1/health", "GET", "200", 0.004);
//! record_error("rate_limit_exceeded_ip");
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
    pub const RESPONSE_SIZE_BYTES: &str = "response_size_bytes";
    pub const ERRORS_TOTAL: &str = "errors_total";
    pub const ACTIVE_SESSIONS: &str = "active_sessions";
}

/// Initialize the Prometheus metrics exporter.
///
/// Sets up metric descriptions and starts the Prometheus HTTP listener
/// on `metrics_addr`.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        names::RESPONSE_SIZE_BYTES,
        "HTTP response body size in bytes"
    );
    describe_counter!(names::ERRORS_TOTAL, "Total number of errors by type");
    describe_gauge!(
        names::ACTIVE_SESSIONS,
        "Number of user sessions currently considered active"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

/// Record one error of the given type.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record HTTP request duration.
pub fn record_request_duration(path: &str, method: &str, status: &str, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "path" => path.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

/// Record HTTP response body size.
pub fn record_response_size(path: &str, method: &str, status: &str, bytes: u64) {
    // Precision loss above 2^53 bytes is irrelevant for a histogram
    #[allow(clippy::cast_precision_loss)]
    let bytes = bytes as f64;
    histogram!(names::RESPONSE_SIZE_BYTES, "path" => path.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .record(bytes);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

/// Active-session counter mirrored into the `active_sessions` gauge.
///
/// Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct SessionGauge {
    count: Arc<AtomicI64>,
}

impl SessionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A user session reached an authentication endpoint.
    pub fn session_started(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
        gauge!(names::ACTIVE_SESSIONS).increment(1.0);
    }

    /// A user session logged out.
    pub fn session_ended(&self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
        gauge!(names::ACTIVE_SESSIONS).decrement(1.0);
    }

    /// Current value of the gauge as seen by this process.
    pub fn current(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}
