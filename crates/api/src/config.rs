//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use orchestration::{RetryPolicy, SchedulerOptions};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; unset means an in-memory
///   history store
/// - `WORKER_COUNT` — instances processed concurrently (default: `8`)
/// - `POLL_INTERVAL_MS` — runnable-instance poll interval (default: `500`)
/// - `ACTIVITY_MAX_ATTEMPTS` — invocations per activity, including the first
///   (default: `3`)
/// - `ACTIVITY_INITIAL_BACKOFF_MS` — delay before the first retry (default:
///   `100`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub worker_count: usize,
    pub poll_interval_ms: u64,
    pub activity_max_attempts: u32,
    pub activity_initial_backoff_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            worker_count: parse_or(lookup("WORKER_COUNT"), defaults.worker_count),
            poll_interval_ms: parse_or(lookup("POLL_INTERVAL_MS"), defaults.poll_interval_ms),
            activity_max_attempts: parse_or(
                lookup("ACTIVITY_MAX_ATTEMPTS"),
                defaults.activity_max_attempts,
            ),
            activity_initial_backoff_ms: parse_or(
                lookup("ACTIVITY_INITIAL_BACKOFF_MS"),
                defaults.activity_initial_backoff_ms,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            worker_count: self.worker_count.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ..SchedulerOptions::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.activity_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.activity_initial_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            worker_count: 8,
            poll_interval_ms: 500,
            activity_max_attempts: 3,
            activity_initial_backoff_ms: 100,
        }
    }
}
