//! Metrics stage: request duration and response size histograms.
//!
//! Series are labelled with the matched route template (`/users/{id}`), not
//! the raw path, so label cardinality is bounded by the route table. Requests
//! that reach the fallback share the [`UNMATCHED_ROUTE`] label and methods
//! outside the standard set share [`OTHER_METHOD`].

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Method, Request, Response};
use tower::{Layer, Service};

use super::observer::ResponseObservation;
use crate::metrics::{record_request_duration, record_response_size};

/// Scrape endpoint, never recorded.
pub const METRICS_PATH: &str = "/metrics";

/// Route label for requests no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Method label for non-standard methods.
pub const OTHER_METHOD: &str = "OTHER";

/// Route template that matched the request, or [`UNMATCHED_ROUTE`].
pub fn route_label<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |p| p.as_str().to_string())
}

/// Method name when standard, otherwise [`OTHER_METHOD`].
pub fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::TRACE => "TRACE",
        _ => OTHER_METHOD,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for MetricsService<S>
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

        if req.uri().path() == METRICS_PATH {
            return Box::pin(async move { inner.call(req).await });
        }

        let route = route_label(&req);
        let method = method_label(req.method());
        let start = Instant::now();

        Box::pin(async move {
            let response = inner.call(req).await?;

            let observed = ResponseObservation::observe(&response);
            let status = observed.status_label();
            record_request_duration(&route, method, &status, start.elapsed().as_secs_f64());
            record_response_size(&route, method, &status, observed.bytes);

            Ok(response)
        })
    }
}
