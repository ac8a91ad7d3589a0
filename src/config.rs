//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `AUTH_SECRET`: HMAC secret for bearer token verification (required)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_IP_MAX`: Requests per window per client address (default: 100)
//! - `RATE_LIMIT_IP_WINDOW_SECS`: IP window length (default: 60)
//! - `RATE_LIMIT_SERVICE_MAX`: Requests per window per service (default: 1000)
//! - `RATE_LIMIT_SERVICE_WINDOW_SECS`: Service window length (default: 60)
//! - `RATE_LIMIT_CLEANUP_SECS`: Interval of the stale-entry sweep (default: 60)
//! - `TRUSTED_PROXIES`: Comma-separated CIDR ranges whose `X-Forwarded-For`
//!   is believed (default: empty, forwarding headers ignored)

use std::env;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::auth::AuthError;
use crate::error::{AppError, AppResult};
use crate::limiter::RateLimiterConfig;
use crate::middleware::ip::TrustedProxies;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything but `json` selects the human format.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Shared HMAC secret for bearer tokens. Required at startup.
    pub auth_secret: Option<SecretString>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests per window per client address (default: 100)
    pub rate_limit_ip_max: u32,

    /// IP window length (default: 60 seconds)
    pub rate_limit_ip_window: Duration,

    /// Requests per window per service caller (default: 1000)
    pub rate_limit_service_max: u32,

    /// Service window length (default: 60 seconds)
    pub rate_limit_service_window: Duration,

    /// Interval between stale-entry sweeps (default: 60 seconds)
    pub rate_limit_cleanup_interval: Duration,

    /// CIDR ranges of reverse proxies trusted for `X-Forwarded-For`
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Log output format (default: pretty)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or validate.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Security
            auth_secret: env::var("AUTH_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),

            // Rate limiting
            rate_limit_ip_max: Self::parse_env("RATE_LIMIT_IP_MAX", 100)?,
            rate_limit_ip_window: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_IP_WINDOW_SECS",
                60,
            )?),
            rate_limit_service_max: Self::parse_env("RATE_LIMIT_SERVICE_MAX", 1000)?,
            rate_limit_service_window: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SERVICE_WINDOW_SECS",
                60,
            )?),
            rate_limit_cleanup_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_CLEANUP_SECS",
                60,
            )?),
            trusted_proxies: Self::parse_trusted_proxies(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: LogFormat::from_env(),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limit_ip_max == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_IP_MAX must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_service_max == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_SERVICE_MAX must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_ip_window.is_zero() || self.rate_limit_service_window.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_IP_WINDOW_SECS and RATE_LIMIT_SERVICE_WINDOW_SECS must be greater than 0"
                    .to_string(),
            ));
        }

        if self.rate_limit_cleanup_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_CLEANUP_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The signing secret, or `MissingAuthSecret` when unset.
    pub fn require_auth_secret(&self) -> Result<&SecretString, AuthError> {
        self.auth_secret
            .as_ref()
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or(AuthError::MissingAuthSecret)
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rate limiter settings derived from this configuration.
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            ip_max_requests: self.rate_limit_ip_max,
            ip_window: self.rate_limit_ip_window,
            service_max_requests: self.rate_limit_service_max,
            service_window: self.rate_limit_service_window,
        }
    }

    /// Proxy ranges allowed to report the client address.
    pub fn trusted_proxy_ranges(&self) -> TrustedProxies {
        TrustedProxies::new(&self.trusted_proxies)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse `TRUSTED_PROXIES` as a comma-separated list.
    fn parse_trusted_proxies() -> Vec<String> {
        env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        let limits = RateLimiterConfig::default();
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Security
            auth_secret: None,
            // Rate limiting
            rate_limit_ip_max: limits.ip_max_requests,
            rate_limit_ip_window: limits.ip_window,
            rate_limit_service_max: limits.service_max_requests,
            rate_limit_service_window: limits.service_window,
            rate_limit_cleanup_interval: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}
