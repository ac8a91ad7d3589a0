//! Database collaborator interface.
//!
//! Connection and migration management live outside this crate. The pipeline
//! only needs a health report for the health endpoints and a close hook for
//! shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Health map key carrying the overall status.
pub const STATUS_KEY: &str = "status";

/// Status value reported by a healthy database.
pub const STATUS_UP: &str = "up";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("failed to close database: {0}")]
    Close(String),
}

/// Health-reporting database service.
pub trait DatabaseService: Send + Sync {
    /// Key/value health report. Contains at least [`STATUS_KEY`].
    fn health(&self) -> HashMap<String, String>;

    /// Release connections. Called once during shutdown.
    fn close(&self) -> Result<(), DatabaseError>;

    /// Whether the database currently reports [`STATUS_UP`].
    fn is_up(&self) -> bool {
        self.health().get(STATUS_KEY).map(String::as_str) == Some(STATUS_UP)
    }

    /// `Ok` when up, otherwise [`DatabaseError::Unavailable`] with the reported status.
    fn check(&self) -> Result<(), DatabaseError> {
        if self.is_up() {
            return Ok(());
        }
        let status = self
            .health()
            .remove(STATUS_KEY)
            .unwrap_or_else(|| "unknown".to_string());
        Err(DatabaseError::Unavailable(status))
    }
}

/// In-process database stand-in that reports its own open/closed state.
///
/// Used when no external database is wired in and by tests.
#[derive(Debug)]
pub struct InMemoryDatabase {
    name: String,
    open: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: AtomicBool::new(true),
        }
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl DatabaseService for InMemoryDatabase {
    fn health(&self) -> HashMap<String, String> {
        let status = if self.open.load(Ordering::SeqCst) {
            STATUS_UP
        } else {
            "down"
        };

        HashMap::from([
            (STATUS_KEY.to_string(), status.to_string()),
            ("database".to_string(), self.name.clone()),
        ])
    }

    fn close(&self) -> Result<(), DatabaseError> {
        if self.open.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DatabaseError::Close("already closed".to_string()))
        }
    }
}
