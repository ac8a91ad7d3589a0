//! Fixed-window request counters keyed by caller identifier.
//!
//! # Algorithm
//!
//! Each identifier owns a counter and the instant its window opened. A request
//! is admitted while the counter is below the class maximum; the first request
//! after the window has elapsed replaces the entry and starts a new window.
//!
//! Two independent classes are tracked:
//!
//! - **IP**: anonymous and user traffic, keyed by client address
//! - **Service**: API keys and service tokens, keyed by service name or key prefix
//!
//! # Known Limitation
//!
//! A fixed window admits up to `2 × max` requests across a window boundary
//! (a burst at the end of one window followed by a burst at the start of the
//! next). Sliding-window or token-bucket semantics would remove the seam.
//!
//! # Concurrency
//!
//! Both maps sit behind a single mutex. [`FixedWindowLimiter::allow`] and
//! [`FixedWindowLimiter::cleanup`] take the same lock, so no caller ever sees a
//! half-updated entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Limits for both identifier classes. Immutable once the limiter is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum requests per window for IP-keyed callers
    pub ip_max_requests: u32,
    /// Window length for IP-keyed callers
    pub ip_window: Duration,
    /// Maximum requests per window for service callers
    pub service_max_requests: u32,
    /// Window length for service callers
    pub service_window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            ip_max_requests: 100,
            ip_window: Duration::from_secs(60),
            service_max_requests: 1000,
            service_window: Duration::from_secs(60),
        }
    }
}

/// Which class an identifier is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    Ip,
    Service,
}

impl LimitClass {
    pub fn from_is_service(is_service: bool) -> Self {
        if is_service {
            LimitClass::Service
        } else {
            LimitClass::Ip
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LimitClass::Ip => "ip",
            LimitClass::Service => "service",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientLimitState {
    request_count: u32,
    window_start: Instant,
}

#[derive(Debug, Default)]
struct Buckets {
    ip: HashMap<String, ClientLimitState>,
    service: HashMap<String, ClientLimitState>,
}

impl Buckets {
    fn class_mut(&mut self, class: LimitClass) -> &mut HashMap<String, ClientLimitState> {
        match class {
            LimitClass::Ip => &mut self.ip,
            LimitClass::Service => &mut self.service,
        }
    }

    fn class(&self, class: LimitClass) -> &HashMap<String, ClientLimitState> {
        match class {
            LimitClass::Ip => &self.ip,
            LimitClass::Service => &self.service,
        }
    }
}

/// Per-identifier fixed-window rate limiter.
///
/// Owned by the application state and shared with the rate-limit stage via
/// `Arc`. Stale entries are removed by [`cleanup`](Self::cleanup), which the
/// application runs on a timer.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<Buckets>,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(Buckets::default()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Check and count a request from `identifier` now.
    pub fn allow(&self, identifier: &str, is_service: bool) -> bool {
        self.allow_at(identifier, is_service, Instant::now())
    }

    /// Check and count a request from `identifier` at `now`.
    pub fn allow_at(&self, identifier: &str, is_service: bool, now: Instant) -> bool {
        let class = LimitClass::from_is_service(is_service);
        let (max_requests, window) = self.limits(class);

        let mut buckets = self.lock();
        let map = buckets.class_mut(class);

        match map.get_mut(identifier) {
            Some(state) if now.saturating_duration_since(state.window_start) <= window => {
                if state.request_count >= max_requests {
                    return false;
                }
                state.request_count += 1;
                true
            }
            _ => {
                // First request, or the previous window has elapsed
                map.insert(
                    identifier.to_string(),
                    ClientLimitState {
                        request_count: 1,
                        window_start: now,
                    },
                );
                true
            }
        }
    }

    /// Remove entries whose window has elapsed. Idempotent.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// Remove entries whose window had elapsed at `now`, returning how many
    /// were evicted.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let ip_window = self.config.ip_window;
        let service_window = self.config.service_window;

        let mut buckets = self.lock();
        let before = buckets.ip.len() + buckets.service.len();

        buckets
            .ip
            .retain(|_, state| now.saturating_duration_since(state.window_start) <= ip_window);
        buckets
            .service
            .retain(|_, state| now.saturating_duration_since(state.window_start) <= service_window);

        before - (buckets.ip.len() + buckets.service.len())
    }

    /// Number of tracked identifiers in a class.
    pub fn len(&self, class: LimitClass) -> usize {
        self.lock().class(class).len()
    }

    /// Whether no identifiers are tracked in either class.
    pub fn is_empty(&self) -> bool {
        let buckets = self.lock();
        buckets.ip.is_empty() && buckets.service.is_empty()
    }

    /// Current request count for an identifier, if tracked.
    pub fn request_count(&self, identifier: &str, class: LimitClass) -> Option<u32> {
        self.lock()
            .class(class)
            .get(identifier)
            .map(|state| state.request_count)
    }

    fn limits(&self, class: LimitClass) -> (u32, Duration) {
        match class {
            LimitClass::Ip => (self.config.ip_max_requests, self.config.ip_window),
            LimitClass::Service => (self.config.service_max_requests, self.config.service_window),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        // Entries are plain values; a panic mid-update cannot leave one torn
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
