//! permgraph-domain: Core permission logic
//!
//! This crate contains:
//! - Capability masks, permission edges and permission sets
//! - The propagation engine computing a principal's transitive permissions
//! - The per-principal permission cache with synchronous and asynchronous modes
//! - Authorization decisions over cached permissions with a live fallback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              permgraph-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/       - Masks, edges, sets, targets │
//! │  propagation/ - Graph loading & traversal   │
//! │  cache/       - Permission cache & refresh  │
//! │  authz/       - Authorization decisions     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod authz;
pub mod cache;
pub mod error;
pub mod model;
pub mod propagation;

// Re-export commonly used types at the crate root
pub use authz::{Authorizer, AuthorizerConfig};
pub use cache::{CacheMode, PermissionCache, PermissionCacheConfig};
pub use error::{DomainError, DomainResult};
