//! Service configuration.
//!
//! Every field can be overridden through `DOCMARK_*` environment
//! variables and, for the server, through CLI flags layered on top. The
//! config is immutable for the lifetime of the process once the service
//! starts.

use std::time::Duration;

/// Default maximum upload size (100 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default per-request conversion deadline in seconds (5 minutes).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default worker pool capacity.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default API route prefix.
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Default graceful-shutdown grace period in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Core service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum accepted upload size in bytes.
    pub max_file_size: u64,
    /// Per-request conversion deadline in seconds.
    pub request_timeout_secs: u64,
    /// Worker pool capacity; clamped to at least 1.
    pub worker_count: usize,
    /// Route prefix for the API surface.
    pub api_prefix: String,
    /// Grace period for draining in-flight work at shutdown, seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            worker_count: DEFAULT_WORKER_COUNT,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl ServiceConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse::<u64>("DOCMARK_MAX_FILE_SIZE") {
            config.max_file_size = v;
        }
        if let Some(v) = env_parse::<u64>("DOCMARK_REQUEST_TIMEOUT") {
            config.request_timeout_secs = v;
        }
        if let Some(v) = env_parse::<usize>("DOCMARK_WORKER_COUNT") {
            config.worker_count = v;
        }
        if let Ok(v) = std::env::var("DOCMARK_API_PREFIX") {
            if !v.is_empty() {
                config.api_prefix = v;
            }
        }
        if let Some(v) = env_parse::<u64>("DOCMARK_SHUTDOWN_GRACE") {
            config.shutdown_grace_secs = v;
        }
        config.clamped()
    }

    /// Set the maximum upload size.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the conversion deadline in seconds.
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Set the worker pool capacity.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Conversion deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Enforce invariants the rest of the system relies on.
    pub fn clamped(mut self) -> Self {
        if self.worker_count == 0 {
            self.worker_count = 1;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
