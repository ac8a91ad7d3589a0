//! HTTP middleware stages of the gatekeeping pipeline.
//!
//! - **Tracing**: trace id propagation and the request span
//! - **Logging**: one `Request` record per request
//! - **Metrics**: request duration and response size histograms
//! - **Audit**: request ids, caller classification, `Auth event` records
//! - **CORS**: fixed permissive headers, `OPTIONS` answered with 204
//! - **Rate Limiting**: fixed-window counters per client address or service
//!   (address from the socket peer, or a trusted proxy's `X-Forwarded-For`)
//! - **Auth Gate**: bearer token required under `/api/`
//!
//! # Architecture
//!
//! ```text
//! Request → Tracing → Logging → Metrics → Audit → CORS → Rate Limit → Auth Gate → Handler
//!                                           ↓       ↓         ↓            ↓
//!                                   X-Request-Id  204    429 Too Many  401 Unauthorized
//! ```
//!
//! The order is declared once in [`PIPELINE_ORDER`].

pub mod audit;
pub mod auth;
pub mod cors;
pub mod ip;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod pipeline;
pub mod rate_limit;
pub mod trace;

pub use audit::{AUTH_ENDPOINTS, AuditLayer, REQUEST_ID_HEADER, RequestId, RequestIdExt};
pub use auth::{AuthGateLayer, UNPROTECTED_API_ROUTES};
pub use cors::CorsHeadersLayer;
pub use ip::{CidrRange, TrustedProxies, UNKNOWN_IP, extract_client_ip};
pub use logging::LoggingLayer;
pub use metrics::MetricsLayer;
pub use observer::ResponseObservation;
pub use pipeline::{PIPELINE_ORDER, Pipeline, Stage};
pub use rate_limit::RateLimitLayer;
pub use trace::{TraceContext, TraceContextLayer};
