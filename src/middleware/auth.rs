//! Bearer token gate for API routes.
//!
//! # Protected Paths
//!
//! Every path under `/api/` requires a valid bearer token except the
//! allow-listed paths in [`UNPROTECTED_API_ROUTES`]. Paths outside `/api/`
//! are not gated.
//!
//! # Path Matching Behavior
//!
//! Allow-list entries use **exact string matching** against
//! `request.uri().path()`:
//! - `/api/v1/health` is open, but `/api/v1/health/` (trailing slash) is NOT
//! - query strings are ignored
//! - matching is case-sensitive
//!
//! # Rejection
//!
//! `401 Unauthorized` with a plain-text body. The router is never invoked.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::{remote_addr, user_agent};
use crate::auth::{TokenVerifier, authorization_header};

/// API paths reachable without a token.
pub const UNPROTECTED_API_ROUTES: [&str; 3] = ["/api/v1/renew", "/api/v1/health", "/api/v1/logout"];

/// Prefix of gated paths.
pub const API_PREFIX: &str = "/api/";

/// Whether a request to `path` needs a valid token.
pub fn requires_auth(path: &str) -> bool {
    path.starts_with(API_PREFIX) && !UNPROTECTED_API_ROUTES.contains(&path)
}

/// Bearer token gate layer.
#[derive(Clone)]
pub struct AuthGateLayer {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthGateLayer {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for AuthGateLayer {
    type Service = AuthGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthGateService {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

/// Bearer token gate service wrapper.
#[derive(Clone)]
pub struct AuthGateService<S> {
    inner: S,
    verifier: Arc<dyn TokenVerifier>,
}

impl<S> Service<Request<Body>> for AuthGateService<S>
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
        let path = req.uri().path();

        if !requires_auth(path) {
            return Box::pin(async move { inner.call(req).await });
        }

        let valid = authorization_header(&req)
            .is_some_and(|header| self.verifier.validate_authorization(header));

        if valid {
            debug!(path = %path, "Bearer token accepted");
            return Box::pin(async move { inner.call(req).await });
        }

        warn!(
            path = %path,
            method = %req.method(),
            remote_addr = %remote_addr(&req),
            user_agent = %user_agent(&req),
            "Unauthorized request"
        );

        Box::pin(async move { Ok(unauthorized_response()) })
    }
}

/// Build the 401 response.
pub fn unauthorized_response() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Unauthorized",
    )
        .into_response()
}
