//! Shared application state for Axum handlers and middleware.
//!
//! The state owns the collaborators that outlive a single request:
//!
//! - **Database**: health reporting, closed on shutdown
//! - **Classifier**: caller identity from the `Authorization` header
//! - **Limiter**: fixed-window counters shared by every request
//! - **Sessions**: the active-sessions gauge
//!
//! # Structured Concurrency
//!
//! The limiter's stale-entry sweep runs as a background task managed with
//! `tokio_util::task::TaskTracker` and `CancellationToken`. Call `shutdown()`
//! to stop it before application exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

use crate::auth::IdentityClassifier;
use crate::config::Config;
use crate::database::DatabaseService;
use crate::limiter::{FixedWindowLimiter, LimitClass};
use crate::metrics::SessionGauge;
use crate::middleware::{Pipeline, TrustedProxies};

/// Shared application state.
///
/// Cloned for each request handler. All internal data is wrapped in `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, db, classifier);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Database collaborator
    pub db: Arc<dyn DatabaseService>,
    /// Caller identity classifier
    pub classifier: IdentityClassifier,
    /// Rate limiter shared by all requests
    pub limiter: Arc<FixedWindowLimiter>,
    /// Active-sessions gauge
    pub sessions: SessionGauge,
    /// Proxies allowed to report the client address
    pub proxies: Arc<TrustedProxies>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state and start the limiter cleanup task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: Config,
        db: Arc<dyn DatabaseService>,
        classifier: IdentityClassifier,
    ) -> Self {
        let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limiter_config()));
        let proxies = Arc::new(config.trusted_proxy_ranges());

        let state = Self {
            config: Arc::new(config),
            db,
            classifier,
            limiter,
            sessions: SessionGauge::new(),
            proxies,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_limiter_cleanup_task(state.config.rate_limit_cleanup_interval);

        state
    }

    /// Middleware pipeline bound to this state's collaborators.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.classifier.clone(),
            self.limiter.clone(),
            self.sessions.clone(),
            self.proxies.clone(),
        )
    }

    /// Spawn the periodic sweep of stale rate-limit entries.
    ///
    /// Only the limiter is moved into the task.
    fn spawn_limiter_cleanup_task(&self, every: Duration) {
        let limiter = self.limiter.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Rate limit cleanup task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = limiter.cleanup();
                        trace!(
                            evicted,
                            ip_entries = limiter.len(LimitClass::Ip),
                            service_entries = limiter.len(LimitClass::Service),
                            "Rate limit entries swept"
                        );
                    }
                }
            }

            debug!("Rate limit cleanup task shutting down");
        });
    }

    /// Gracefully shut down background tasks and close the database.
    ///
    /// 1. Signals all tasks to stop via the cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    /// 4. Closes the database
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");

        if let Err(e) = self.db.close() {
            error!(error = %e, "Failed to close database");
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
