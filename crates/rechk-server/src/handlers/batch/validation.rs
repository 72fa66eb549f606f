//! Request validation.
//!
//! Whole-request problems (not an object, too many keys) reject the batch.
//! Problems with a single entry only turn that entry into `null`.

use serde_json::Value;

use super::types::{
    BatchCheckError, BatchCheckItem, BatchCheckRequest, BatchCheckResult, BatchLimits,
    EntryRejection, PatternEntry,
};

/// Validates a request body and every entry in it.
pub fn validate_request(value: Value, limits: &BatchLimits) -> BatchCheckResult<BatchCheckRequest> {
    let Value::Object(map) = value else {
        return Err(BatchCheckError::NotAnObject);
    };

    if map.len() > limits.max_batch_size {
        return Err(BatchCheckError::BatchTooLarge {
            size: map.len(),
            max: limits.max_batch_size,
        });
    }

    let items = map
        .into_iter()
        .map(|(key, value)| BatchCheckItem {
            entry: validate_entry(&value, limits),
            key,
        })
        .collect();

    Ok(BatchCheckRequest::new(items))
}

/// Validates a single `{pattern, modifier}` entry.
///
/// The length limit applies to the trimmed pattern and counts UTF-16 code
/// units, so a character outside the Basic Multilingual Plane counts twice.
pub fn validate_entry(value: &Value, limits: &BatchLimits) -> Result<PatternEntry, EntryRejection> {
    let Value::Object(entry) = value else {
        return Err(EntryRejection::NotAnObject);
    };
    let Some(pattern) = entry.get("pattern").and_then(Value::as_str) else {
        return Err(EntryRejection::PatternNotString);
    };
    let Some(modifier) = entry.get("modifier").and_then(Value::as_str) else {
        return Err(EntryRejection::ModifierNotString);
    };

    let entry = PatternEntry::new(pattern, modifier);
    let length = entry.pattern.encode_utf16().count();
    if length > limits.max_pattern_length {
        return Err(EntryRejection::PatternTooLong {
            length,
            max: limits.max_pattern_length,
        });
    }

    Ok(entry)
}
