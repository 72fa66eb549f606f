//! Data types shared by all checker backends.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default time budget for a single check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// Verdict reported by a checker.
///
/// The status vocabulary belongs to the checker. The three statuses the
/// service reasons about have their own variants; anything else a backend
/// reports is kept verbatim in [`CheckStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckStatus {
    /// The pattern has no super-linear backtracking behaviour.
    Safe,
    /// The pattern can backtrack catastrophically.
    Vulnerable,
    /// The checker could not reach a verdict (invalid input, unsupported
    /// construct, internal timeout).
    Unknown,
    /// Any other status reported by an external checker.
    Other(String),
}

impl CheckStatus {
    /// Returns the wire representation of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Safe => "safe",
            Self::Vulnerable => "vulnerable",
            Self::Unknown => "unknown",
            Self::Other(status) => status,
        }
    }

    /// Returns a bounded label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Vulnerable => "vulnerable",
            Self::Unknown => "unknown",
            Self::Other(_) => "other",
        }
    }
}

impl From<String> for CheckStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "safe" => Self::Safe,
            "vulnerable" => Self::Vulnerable,
            "unknown" => Self::Unknown,
            _ => Self::Other(status),
        }
    }
}

impl From<CheckStatus> for String {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one pattern/modifier pair.
///
/// Only `status` is interpreted by this service. Everything else the
/// checker reports (complexity, attack string, hotspots, error details) is
/// carried through untouched in `details` and flattened into the same JSON
/// object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl CheckResult {
    /// Creates a result with the given status and no details.
    pub fn new(status: CheckStatus) -> Self {
        Self {
            status,
            details: Map::new(),
        }
    }

    /// Adds a detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns true if the checker reached a conclusive verdict.
    ///
    /// Only definitive results are eligible for caching.
    pub fn is_definitive(&self) -> bool {
        self.status != CheckStatus::Unknown
    }

    /// Converts the result into its JSON representation.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.details.len() + 1);
        object.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        for (key, value) in &self.details {
            if key != "status" {
                object.insert(key.clone(), value.clone());
            }
        }
        Value::Object(object)
    }
}

/// Options passed to every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    /// Time budget for the check.
    pub timeout: Duration,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

impl CheckOptions {
    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What happened when a checker was asked about one entry.
///
/// The batch handler keeps these apart for logging and metrics and only
/// collapses the non-`Completed` cases to `null` when building the response.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The checker returned a result (definitive or not).
    Completed(CheckResult),
    /// The check exceeded its time budget.
    TimedOut,
    /// The checker failed.
    Failed(String),
}

impl CheckOutcome {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(result) => result.status.metric_label(),
            Self::TimedOut => "timeout",
            Self::Failed(_) => "error",
        }
    }

    /// Returns the result if the checker completed.
    pub fn result(&self) -> Option<&CheckResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Converts the outcome into the value placed in the response map.
    pub fn into_response_value(self) -> Value {
        match self {
            Self::Completed(result) => result.to_value(),
            Self::TimedOut | Self::Failed(_) => Value::Null,
        }
    }
}

impl From<crate::error::CheckerError> for CheckOutcome {
    fn from(err: crate::error::CheckerError) -> Self {
        match err {
            crate::error::CheckerError::Timeout { .. } => Self::TimedOut,
            other => Self::Failed(other.to_string()),
        }
    }
}
