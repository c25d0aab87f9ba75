//! permgraph-server: Service wiring, configuration and CLI support
//!
//! This crate contains the application layer including:
//! - Configuration management
//! - Structured logging setup
//! - Storage to domain adapters
//! - The authorization service used by the `permgraph` binary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              permgraph-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  logging.rs  - tracing-subscriber setup     │
//! │  adapters.rs - EdgeStore -> EdgeReader      │
//! │  service.rs  - AuthorizationService         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod logging;
pub mod service;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use service::{AuthorizationService, ServiceError};
