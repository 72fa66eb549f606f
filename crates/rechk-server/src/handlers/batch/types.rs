//! Data types for batch check operations.

use rechk_domain::cache::CacheKey;
use rechk_domain::checker::{CheckOutcome, CheckResult};
use serde_json::{Map, Value};

/// Maximum number of expressions in one request.
pub const MAX_BATCH_SIZE: usize = 500;

/// Maximum trimmed pattern length, in UTF-16 code units.
pub const MAX_PATTERN_LENGTH: usize = 1000;

/// Limits applied while validating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_batch_size: usize,
    pub max_pattern_length: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            max_pattern_length: MAX_PATTERN_LENGTH,
        }
    }
}

/// A validated pattern/modifier pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternEntry {
    /// The pattern with surrounding whitespace removed.
    pub pattern: String,
    pub modifier: String,
}

impl PatternEntry {
    /// Creates an entry, trimming the pattern.
    pub fn new(pattern: &str, modifier: impl Into<String>) -> Self {
        Self {
            pattern: rechk_domain::cache::trim_pattern(pattern).to_string(),
            modifier: modifier.into(),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.pattern, &self.modifier)
    }
}

/// Why a single entry was not checked. The entry maps to `null`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryRejection {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("pattern is missing or not a string")]
    PatternNotString,

    #[error("modifier is missing or not a string")]
    ModifierNotString,

    #[error("pattern length {length} exceeds maximum allowed {max}")]
    PatternTooLong { length: usize, max: usize },
}

/// One keyed entry of a batch request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCheckItem {
    /// The caller's key, echoed in the response.
    pub key: String,
    /// The entry, or the reason it will not be checked.
    pub entry: Result<PatternEntry, EntryRejection>,
}

/// Request for a batch of pattern checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchCheckRequest {
    /// Entries in the order the caller sent them.
    pub items: Vec<BatchCheckItem>,
}

impl BatchCheckRequest {
    /// Creates a request from already-validated items.
    pub fn new(items: Vec<BatchCheckItem>) -> Self {
        Self { items }
    }

    /// Validates a JSON request body.
    pub fn from_json(value: Value, limits: &BatchLimits) -> BatchCheckResult<Self> {
        super::validation::validate_request(value, limits)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// The entry failed validation; the checker was not invoked.
    Rejected(EntryRejection),
    /// Served from the result cache.
    Cached(CheckResult),
    /// The checker was asked (or a concurrent request asked on our behalf).
    Checked(CheckOutcome),
}

impl EntryOutcome {
    /// Returns the check result, if there is one.
    pub fn result(&self) -> Option<&CheckResult> {
        match self {
            Self::Rejected(_) => None,
            Self::Cached(result) => Some(result),
            Self::Checked(outcome) => outcome.result(),
        }
    }

    /// Converts the outcome into the value placed in the response map.
    pub fn into_response_value(self) -> Value {
        match self {
            Self::Rejected(_) => Value::Null,
            Self::Cached(result) => result.to_value(),
            Self::Checked(outcome) => outcome.into_response_value(),
        }
    }
}

/// Result of a single entry within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCheckItemResult {
    pub key: String,
    pub outcome: EntryOutcome,
}

/// Response from a batch check operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchCheckResponse {
    /// Results for each entry, in the same order as the request.
    pub results: Vec<BatchCheckItemResult>,
}

impl BatchCheckResponse {
    /// Looks up the outcome for a key.
    pub fn get(&self, key: &str) -> Option<&EntryOutcome> {
        self.results
            .iter()
            .find(|item| item.key == key)
            .map(|item| &item.outcome)
    }

    /// Builds the JSON response map: key to result or `null`.
    pub fn into_json(self) -> Value {
        let mut map = Map::with_capacity(self.results.len());
        for item in self.results {
            map.insert(item.key, item.outcome.into_response_value());
        }
        Value::Object(map)
    }
}

/// Errors that reject a whole batch request.
///
/// The messages are shown to API clients as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchCheckError {
    /// The request body is not a JSON object.
    #[error("Invalid JSON structure, or missing Content-Type: application/json header")]
    NotAnObject,

    /// The request has more entries than allowed.
    #[error("Greater than {max} expressions")]
    BatchTooLarge { size: usize, max: usize },
}

/// Result type for batch check operations.
pub type BatchCheckResult<T> = Result<T, BatchCheckError>;
