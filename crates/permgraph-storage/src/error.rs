//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
///
/// Backends that talk to an external system add their connection and query
/// failures here.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Health status reported by a storage backend.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the backend is usable.
    pub healthy: bool,
    /// Round-trip latency of the health probe.
    pub latency: Duration,
    /// Free-form backend description.
    pub message: Option<String>,
}
