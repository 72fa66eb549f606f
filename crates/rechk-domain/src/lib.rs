//! rechk-domain: Core regex check domain logic
//!
//! This crate contains the pieces that do not depend on HTTP:
//! - Check result caching with FIFO trimming
//! - The `RegexChecker` abstraction and its result model
//! - A built-in static analyzer for catastrophic backtracking
//! - A checker that delegates to an external program
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rechk-domain                  │
//! ├─────────────────────────────────────────────┤
//! │  cache/     - Definitive result cache       │
//! │  checker/   - Checker trait & backends      │
//! │  analyzer/  - Static ReDoS analysis         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod analyzer;
pub mod cache;
pub mod checker;
pub mod error;

// Re-export commonly used types at the crate root
pub use analyzer::StaticChecker;
pub use cache::{CacheKey, ResultCache, ResultCacheConfig};
pub use checker::{
    CheckOptions, CheckOutcome, CheckResult, CheckStatus, CommandChecker, CommandCheckerConfig,
    RegexChecker,
};
pub use error::{CheckerError, CheckerResult};
