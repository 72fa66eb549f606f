//! Batch pattern checks with caching and two-stage deduplication.
//!
//! A request is a JSON object mapping caller keys to
//! `{"pattern": ..., "modifier": ...}` entries. The response maps the same
//! keys, in the same order, to a check result or `null`.
//!
//! Work is saved in three ways:
//!
//! 1. **Result cache**: definitive results are reused across requests
//! 2. **Intra-batch deduplication**: identical entries execute only once
//! 3. **Singleflight**: concurrent requests for the same entry share one check
//!
//! The cache is trimmed once per batch, before any entry is looked up.

mod handler;
mod singleflight;
mod types;
mod validation;

pub use handler::{register_batch_metrics, BatchCheckHandler};
pub use types::{
    BatchCheckError, BatchCheckItem, BatchCheckItemResult, BatchCheckRequest, BatchCheckResponse,
    BatchCheckResult, BatchLimits, EntryOutcome, EntryRejection, PatternEntry, MAX_BATCH_SIZE,
    MAX_PATTERN_LENGTH,
};
pub use validation::{validate_entry, validate_request};
