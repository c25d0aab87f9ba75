//! permgraph-storage: Edge storage abstraction layer
//!
//! This crate provides the storage abstraction for permission edges:
//! - EdgeStore trait for storage operations
//! - In-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             permgraph-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - EdgeStore trait, filters     │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - Storage errors               │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{HealthStatus, StorageError, StorageResult};
pub use memory::MemoryEdgeStore;
pub use traits::{EdgeFilter, EdgeStore, StoredEdge, PERMISSION_LINK_CLASS};
