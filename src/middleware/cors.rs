//! CORS stage with a fixed, permissive header set.
//!
//! Every response carries the same four headers. `OPTIONS` requests are
//! answered with `204 No Content` without reaching the inner stages.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderName,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use tower::{Layer, Service};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, PATCH";
pub const ALLOW_HEADERS: &str = "Accept, Authorization, Content-Type, X-CSRF-Token";
pub const ALLOW_CREDENTIALS: &str = "false";

const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
    (ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
    (ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
    (ACCESS_CONTROL_ALLOW_CREDENTIALS, ALLOW_CREDENTIALS),
];

/// Overwrite the CORS headers on `headers`.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CorsHeadersLayer;

impl<S> Layer<S> for CorsHeadersLayer {
    type Service = CorsHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorsHeadersService { inner }
    }
}

#[derive(Clone)]
pub struct CorsHeadersService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for CorsHeadersService<S>
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
        if req.method() == Method::OPTIONS {
            return Box::pin(async move {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NO_CONTENT;
                apply_cors_headers(response.headers_mut());
                Ok(response)
            });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            apply_cors_headers(response.headers_mut());
            Ok(response)
        })
    }
}
