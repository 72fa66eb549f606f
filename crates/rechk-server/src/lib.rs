//! rechk-server: Batch orchestration and configuration
//!
//! This crate sits between the HTTP layer and the domain:
//! - Request validation for batch checks
//! - Batch check handler with deduplication, caching and timeouts
//! - Checker backend selection
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rechk-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  checker.rs  - Configured checker backend   │
//! │  handlers/   - Request handlers             │
//! │    batch/         - Batch checks            │
//! └─────────────────────────────────────────────┘
//! ```

pub mod checker;
pub mod config;
pub mod handlers;

// Re-exports for convenience
pub use checker::ConfiguredChecker;
pub use config::{ConfigLoadError, ServerConfig};
