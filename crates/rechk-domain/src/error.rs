//! Error types for checker operations.

use thiserror::Error;

/// Errors a [`RegexChecker`](crate::checker::RegexChecker) can report.
///
/// None of these reach the HTTP client directly: the batch handler turns
/// them into a `null` entry and keeps them for logging and metrics.
#[derive(Debug, Error)]
pub enum CheckerError {
    /// The check did not finish within its time budget.
    #[error("check timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The external checker process could not be started.
    #[error("failed to spawn checker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while talking to the external checker.
    #[error("checker i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The external checker exited unsuccessfully.
    #[error("checker exited with status {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    /// The checker produced output that is not a check result.
    #[error("invalid checker output: {message}")]
    InvalidOutput { message: String },

    /// The analysis task panicked or was cancelled.
    #[error("checker task failed: {message}")]
    Panicked { message: String },
}

/// Result type for checker operations.
pub type CheckerResult<T> = Result<T, CheckerError>;
