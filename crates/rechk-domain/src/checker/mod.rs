//! Regex checker abstraction.
//!
//! A checker decides whether a pattern/modifier pair is prone to
//! catastrophic backtracking. The service treats it as a black box: it only
//! looks at the `status` of the returned [`CheckResult`] to decide whether
//! the result may be cached.
//!
//! Two backends ship with the crate:
//!
//! - [`StaticChecker`](crate::analyzer::StaticChecker) - built-in heuristic
//!   analysis of the pattern syntax tree
//! - [`CommandChecker`] - delegates to an external program over stdin/stdout

mod command;
mod types;

use async_trait::async_trait;

use crate::error::CheckerResult;

pub use command::{CommandChecker, CommandCheckerConfig};
pub use types::{CheckOptions, CheckOutcome, CheckResult, CheckStatus, DEFAULT_CHECK_TIMEOUT};

/// Trait implemented by every checker backend.
#[async_trait]
pub trait RegexChecker: Send + Sync {
    /// Checks a (trimmed) pattern with the given modifier.
    ///
    /// Implementations should honour `options.timeout` where they can; the
    /// batch handler enforces it independently as well.
    async fn check(
        &self,
        pattern: &str,
        modifier: &str,
        options: &CheckOptions,
    ) -> CheckerResult<CheckResult>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}
