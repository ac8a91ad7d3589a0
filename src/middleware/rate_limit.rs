//! Per-identity rate limiting stage.
//!
//! # Algorithm
//!
//! Admission is decided by the shared [`FixedWindowLimiter`]. The bucket for a
//! request comes from [`IdentityClassifier::rate_limit_identity`]:
//!
//! - API keys: `api-key-<first 16 chars>` in the service class
//! - Verified service tokens: the token subject in the service class
//! - Everything else: the client IP in the IP class, taken from the socket
//!   peer or, behind a trusted proxy, from its forwarding headers
//!
//! # Response
//!
//! On rejection (429):
//! - `Retry-After: 60`
//! - plain-text body `Rate limit exceeded. Please try again later.`
//!
//! The health endpoint is never limited.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use super::audit::request_auth_info;
use super::ip::{TrustedProxies, extract_client_ip};
use crate::auth::{IdentityClassifier, authorization_header};
use crate::limiter::{FixedWindowLimiter, LimitClass};
use crate::metrics;

/// Path exempt from rate limiting.
pub const RATE_LIMIT_EXEMPT_PATH: &str = "/api/v1/health";

/// Fixed `Retry-After` value in seconds.
pub const RETRY_AFTER_SECS: &str = "60";

/// Body of a 429 response.
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Rate limiting layer for the Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let layer = RateLimitLayer::new(limiter, classifier, Arc::new(TrustedProxies::default()));
/// let app = Router::new()
///     .route("/api/v1/items", get(handler))
///     .layer(layer);
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<FixedWindowLimiter>,
    classifier: IdentityClassifier,
    proxies: Arc<TrustedProxies>,
}

impl RateLimitLayer {
    pub fn new(
        limiter: Arc<FixedWindowLimiter>,
        classifier: IdentityClassifier,
        proxies: Arc<TrustedProxies>,
    ) -> Self {
        Self {
            limiter,
            classifier,
            proxies,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            classifier: self.classifier.clone(),
            proxies: self.proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<FixedWindowLimiter>,
    classifier: IdentityClassifier,
    proxies: Arc<TrustedProxies>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        if req.uri().path() == RATE_LIMIT_EXEMPT_PATH {
            return Box::pin(async move { inner.call(req).await });
        }

        let header = authorization_header(&req);
        let info = request_auth_info(&req).unwrap_or_else(|| self.classifier.classify(header));
        let client_ip = extract_client_ip(&req, &self.proxies);
        let identity = self
            .classifier
            .rate_limit_identity(header, &info, &client_ip);

        if self.limiter.allow(&identity.identifier, identity.is_service) {
            return Box::pin(async move { inner.call(req).await });
        }

        let class = LimitClass::from_is_service(identity.is_service);
        warn!(
            identifier = %identity.identifier,
            client_type = identity.client_type,
            class = class.as_str(),
            path = %req.uri().path(),
            method = %req.method(),
            "Rate limit exceeded"
        );
        metrics::record_error(&format!("rate_limit_exceeded_{}", class.as_str()));

        Box::pin(async move { Ok(rate_limited_response()) })
    }
}

/// Build the 429 response.
pub fn rate_limited_response() -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (RETRY_AFTER, RETRY_AFTER_SECS),
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
        ],
        RATE_LIMITED_MESSAGE,
    )
        .into_response()
}
