//! Request logging stage.
//!
//! Emits one `Request` record per inbound request. Static assets and the
//! metrics scrape endpoint are skipped to keep the log readable.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::info;

use super::ip::remote_addr;

/// Exact paths that are never logged.
const SKIPPED_PATHS: [&str; 2] = ["/favicon.png", "/metrics"];

/// Path prefix of bundled frontend assets.
const ASSET_PREFIX: &str = "/_app/";

/// Whether a request to `path` should be logged.
pub fn should_log(path: &str) -> bool {
    !SKIPPED_PATHS.contains(&path) && !path.starts_with(ASSET_PREFIX)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

#[derive(Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for LoggingService<S>
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
        let path = req.uri().path();
        if should_log(path) {
            info!(
                method = %req.method(),
                path = %path,
                remote_addr = %remote_addr(&req),
                "Request"
            );
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
