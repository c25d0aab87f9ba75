//! Domain error types for permission propagation and authorization.

use thiserror::Error;

/// Domain-specific errors.
///
/// Any of these surfacing from an authorization check must be treated as a
/// denial by the caller.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// The edge store failed while loading edges.
    #[error("edge store error: {message}")]
    EdgeStoreError { message: String },

    /// The keyed cache store failed.
    #[error("cache store error: {message}")]
    CacheStoreError { message: String },

    /// No current cache entry appeared before the wait deadline.
    #[error("timed out after {waited_ms}ms waiting for permissions of {principal_id}")]
    CacheWaitTimeout { principal_id: String, waited_ms: u64 },

    /// Publishing or subscribing to invalidations failed.
    #[error("invalidation channel error: {message}")]
    InvalidationChannelError { message: String },

    /// An identifier was empty or otherwise unusable.
    #[error("invalid identifier: {value:?}")]
    InvalidIdentifier { value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
