//! Audit stage: request ids and authentication event records.
//!
//! # Features
//!
//! - Generates a UUIDv4 request id for every request
//! - Binds the request id to the request (extension and `X-Request-Id` header),
//!   the current span and the response
//! - Classifies the caller once and stores the [`AuthInfo`] as a request
//!   extension for the inner stages
//! - Emits one `Auth event` record per request to an authentication endpoint
//! - Maintains the active-sessions gauge
//!
//! The stage never changes the response status or body.

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Span, debug, info};
use uuid::Uuid;

use super::ip::{remote_addr, user_agent};
use super::trace::TraceContext;
use crate::auth::{AuthInfo, IdentityClassifier};
use crate::metrics::SessionGauge;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logout endpoint; a successful call ends a user session.
pub const LOGOUT_PATH: &str = "/api/v1/logout";

/// Endpoints whose requests produce an `Auth event` record.
pub const AUTH_ENDPOINTS: [&str; 8] = [
    "/auth/google",
    "/auth/google/callback",
    "/api/v1/token/refresh",
    LOGOUT_PATH,
    "/api/v1/renew",
    "/api/v1/apikeys",
    "/api/v1/apikeys/create",
    "/api/v1/apikeys/revoke",
];

/// Fallback header value when request ID parsing fails.
static UNKNOWN_REQUEST_ID: HeaderValue = HeaderValue::from_static("unknown");

/// Request id bound by the audit stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn header_value(&self) -> HeaderValue {
        self.0
            .parse()
            .unwrap_or_else(|_| UNKNOWN_REQUEST_ID.clone())
    }
}

/// Whether `path` is an authentication endpoint.
pub fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.contains(&path)
}

/// The [`AuthInfo`] stored by the audit stage, if it ran.
pub fn request_auth_info<B>(req: &Request<B>) -> Option<AuthInfo> {
    req.extensions().get::<AuthInfo>().cloned()
}

/// Audit layer for the Tower middleware stack.
#[derive(Clone)]
pub struct AuditLayer {
    classifier: IdentityClassifier,
    sessions: SessionGauge,
}

impl AuditLayer {
    pub fn new(classifier: IdentityClassifier, sessions: SessionGauge) -> Self {
        Self {
            classifier,
            sessions,
        }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            classifier: self.classifier.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

/// Audit service wrapper.
#[derive(Clone)]
pub struct AuditService<S> {
    inner: S,
    classifier: IdentityClassifier,
    sessions: SessionGauge,
}

impl<S> Service<Request<Body>> for AuditService<S>
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
        let start = Instant::now();
        let request_id = RequestId::generate();
        let trace_id = req
            .extensions()
            .get::<TraceContext>()
            .map(|c| c.trace_id.clone());

        req.headers_mut()
            .insert(REQUEST_ID_HEADER, request_id.header_value());

        let span = Span::current();
        span.record("request_id", request_id.as_str());

        let info = self.classifier.classify_request(&req);
        span.record("auth_type", info.auth_type.as_str());
        debug!(
            request_id = %request_id.as_str(),
            trace_id = trace_id.as_deref().unwrap_or_default(),
            auth_type = %info.auth_type,
            "Processing request"
        );

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let auth_endpoint = is_auth_endpoint(&path);

        if auth_endpoint && info.is_user_session() {
            self.sessions.session_started();
        }

        // Client details are only needed for the audit record
        let client = auth_endpoint.then(|| (remote_addr(&req), user_agent(&req)));

        req.extensions_mut().insert(request_id.clone());
        req.extensions_mut().insert(info.clone());

        let sessions = self.sessions.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            response
                .headers_mut()
                .insert(REQUEST_ID_HEADER, request_id.header_value());

            if let Some((client_ip, user_agent)) = client {
                let status = response.status();
                let success = status.is_success();

                if path == LOGOUT_PATH && info.is_user_session() && success {
                    sessions.session_ended();
                }

                info!(
                    request_id = %request_id.as_str(),
                    trace_id = trace_id.as_deref().unwrap_or_default(),
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    success,
                    client_ip = %client_ip,
                    user_agent = %user_agent,
                    auth_type = %info.auth_type,
                    user_id = info.user_id.as_deref().unwrap_or_default(),
                    service_name = info.service_name.as_deref().unwrap_or_default(),
                    is_service = info.is_service,
                    "Auth event"
                );
            }

            Ok(response)
        })
    }
}

/// Extension trait to read the request id from requests.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<String>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<String> {
        self.extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| {
                self.headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            })
    }
}
