//! Error types for the docmark library.
//!
//! One taxonomy covers the whole conversion path. The variants map onto
//! distinct HTTP status codes at the boundary:
//!
//! * validation failures (unsupported type, oversized payload) are raised
//!   before any worker is engaged and surface as 4xx,
//! * [`ConvertError::Timeout`] surfaces as 504 and the caller may retry,
//! * [`ConvertError::Failed`] surfaces as 500; its message can carry
//!   worker-internal detail and is sanitized by the HTTP layer,
//! * [`ConvertError::PoolNotRunning`] is a startup-ordering bug, 503.

use thiserror::Error;

/// Errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The derived extension is outside the allow-list, or the sniffed
    /// mimetype is neither supported nor a `text/*` type.
    #[error("file type '{0}' is not supported")]
    UnsupportedType(String),

    /// Upload exceeds the configured size limit.
    #[error("file size {size} bytes exceeds maximum allowed size of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// The dispatch deadline elapsed before the worker answered. The
    /// worker is killed and replaced before this is returned.
    #[error("conversion timed out after {0} seconds")]
    Timeout(u64),

    /// The worker-side conversion logic failed, or the worker process
    /// died mid-request. The pool stays usable for subsequent calls.
    #[error("conversion failed: {0}")]
    Failed(String),

    /// Dispatch was attempted on a pool that is not in the Started
    /// state. Configuration/startup-ordering bug, never retryable.
    #[error("worker pool is not running ({0})")]
    PoolNotRunning(&'static str),

    /// The pool could not provision its worker processes.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

impl ConvertError {
    /// HTTP status code this error maps to at the service boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ConvertError::UnsupportedType(_) => 415,
            ConvertError::PayloadTooLarge { .. } => 413,
            ConvertError::Timeout(_) => 504,
            ConvertError::Failed(_) => 500,
            ConvertError::PoolNotRunning(_) | ConvertError::SpawnFailed(_) => 503,
        }
    }

    /// Stable machine-readable error type for the response body.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConvertError::UnsupportedType(_) => "unsupported_type",
            ConvertError::PayloadTooLarge { .. } => "payload_too_large",
            ConvertError::Timeout(_) => "conversion_timeout",
            ConvertError::Failed(_) => "conversion_failed",
            ConvertError::PoolNotRunning(_) => "pool_not_running",
            ConvertError::SpawnFailed(_) => "worker_spawn_failed",
        }
    }

    /// True for user-input faults that should not be retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConvertError::UnsupportedType(_) | ConvertError::PayloadTooLarge { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConvertError>;
