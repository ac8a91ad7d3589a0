//! Tracing stage: trace id propagation and the per-request span.
//!
//! The stage is two layers. [`TraceContextLayer`] runs first and attaches a
//! [`TraceContext`] to the request, taken from a W3C `traceparent` header or
//! freshly generated. [`http_trace_layer`] then opens the request span with
//! that trace id and logs the response with its latency.
//!
//! Span fields `request_id` and `auth_type` start empty and are filled in by
//! the audit stage.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tower_http::LatencyUnit;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnResponse, MakeSpan, TraceLayer};
use tracing::{Level, Span, field};
use uuid::Uuid;

/// W3C trace context request header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const TRACE_ID_LEN: usize = 32;
const PARENT_ID_LEN: usize = 16;

/// Trace identity of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// Caller's span id when propagated from `traceparent`.
    pub parent_id: Option<String>,
}

impl TraceContext {
    /// Fresh root context with a random trace id.
    pub fn generate() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            parent_id: None,
        }
    }

    /// Parse a `traceparent` header (`00-<trace-id>-<parent-id>-<flags>`).
    ///
    /// Only version `00` is accepted. All-zero ids are invalid.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        if parts.next().is_some() || version != "00" {
            return None;
        }
        if !is_hex_id(trace_id, TRACE_ID_LEN) || !is_hex_id(parent_id, PARENT_ID_LEN) {
            return None;
        }
        if flags.len() != 2 || !flags.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_id: Some(parent_id.to_ascii_lowercase()),
        })
    }

    /// Context for a request: propagated when valid, generated otherwise.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        req.headers()
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::from_traceparent)
            .unwrap_or_else(Self::generate)
    }
}

fn is_hex_id(id: &str, len: usize) -> bool {
    id.len() == len && id.bytes().all(|b| b.is_ascii_hexdigit()) && id.bytes().any(|b| b != b'0')
}

/// Layer that attaches a [`TraceContext`] extension to every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceContextLayer;

impl<S> Layer<S> for TraceContextLayer {
    type Service = TraceContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceContextService { inner }
    }
}

#[derive(Clone)]
pub struct TraceContextService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TraceContextService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let context = TraceContext::from_request(&req);
        req.extensions_mut().insert(context);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

/// Span factory for [`TraceLayer`] that names the span `<METHOD> <path>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestSpan;

impl<B> MakeSpan<B> for MakeRequestSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        let trace_id = req
            .extensions()
            .get::<TraceContext>()
            .map(|c| c.trace_id.as_str())
            .unwrap_or_default();

        tracing::info_span!(
            "request",
            otel.name = %format!("{} {}", req.method(), req.uri().path()),
            method = %req.method(),
            path = %req.uri().path(),
            trace_id = %trace_id,
            request_id = field::Empty,
            auth_type = field::Empty,
        )
    }
}

/// HTTP trace layer used by the tracing stage.
pub type HttpTraceLayer = TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeRequestSpan>;

/// Build the request span layer.
pub fn http_trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(MakeRequestSpan)
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        )
}
