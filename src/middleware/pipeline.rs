//! Ordered composition of the gatekeeping stages.
//!
//! [`PIPELINE_ORDER`] lists the stages from outermost to innermost.
//! [`Pipeline::apply`] layers them onto a router in that order, so the first
//! entry sees every request first and every response last.

use std::fmt;
use std::sync::Arc;

use axum::Router;

use super::audit::AuditLayer;
use super::auth::AuthGateLayer;
use super::cors::CorsHeadersLayer;
use super::ip::TrustedProxies;
use super::logging::LoggingLayer;
use super::metrics::MetricsLayer;
use super::rate_limit::RateLimitLayer;
use super::trace::{TraceContextLayer, http_trace_layer};
use crate::auth::IdentityClassifier;
use crate::limiter::FixedWindowLimiter;
use crate::metrics::SessionGauge;

/// One link in the middleware pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Tracing,
    Logging,
    Metrics,
    Audit,
    Cors,
    RateLimit,
    AuthGate,
}

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Stage::Tracing => "tracing",
            Stage::Logging => "logging",
            Stage::Metrics => "metrics",
            Stage::Audit => "audit",
            Stage::Cors => "cors",
            Stage::RateLimit => "rate_limit",
            Stage::AuthGate => "auth_gate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage order, outermost first.
pub const PIPELINE_ORDER: [Stage; 7] = [
    Stage::Tracing,
    Stage::Logging,
    Stage::Metrics,
    Stage::Audit,
    Stage::Cors,
    Stage::RateLimit,
    Stage::AuthGate,
];

/// Shared collaborators of the stages.
#[derive(Clone)]
pub struct Pipeline {
    classifier: IdentityClassifier,
    limiter: Arc<FixedWindowLimiter>,
    sessions: SessionGauge,
    proxies: Arc<TrustedProxies>,
}

impl Pipeline {
    pub fn new(
        classifier: IdentityClassifier,
        limiter: Arc<FixedWindowLimiter>,
        sessions: SessionGauge,
        proxies: Arc<TrustedProxies>,
    ) -> Self {
        Self {
            classifier,
            limiter,
            sessions,
            proxies,
        }
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &'static [Stage] {
        &PIPELINE_ORDER
    }

    /// Wrap every route of `router`, fallback included, in all stages.
    ///
    /// Routes and the fallback must be registered before calling this.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Router::layer wraps what is already there, so innermost goes first
        PIPELINE_ORDER
            .iter()
            .rev()
            .fold(router, |router, stage| self.apply_stage(router, *stage))
    }

    fn apply_stage<S>(&self, router: Router<S>, stage: Stage) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        match stage {
            Stage::Tracing => router.layer(http_trace_layer()).layer(TraceContextLayer),
            Stage::Logging => router.layer(LoggingLayer),
            Stage::Metrics => router.layer(MetricsLayer),
            Stage::Audit => router.layer(AuditLayer::new(
                self.classifier.clone(),
                self.sessions.clone(),
            )),
            Stage::Cors => router.layer(CorsHeadersLayer),
            Stage::RateLimit => router.layer(RateLimitLayer::new(
                self.limiter.clone(),
                self.classifier.clone(),
                self.proxies.clone(),
            )),
            Stage::AuthGate => router.layer(AuthGateLayer::new(self.classifier.verifier().clone())),
        }
    }
}
