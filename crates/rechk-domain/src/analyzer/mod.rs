//! Built-in static ReDoS analyzer.
//!
//! Parses the pattern into a small syntax tree and looks for the shapes
//! that make a backtracking engine blow up:
//!
//! | Shape | Example | Complexity |
//! |-------|---------|------------|
//! | Nested unbounded repeat | `(a+)+`, `(\w+\s?)*` | exponential |
//! | Overlapping alternatives under a repeat | `(a\|a)*`, `(\d\|\w)+` | exponential |
//! | Repeated backreference | `(a+)\1+` | exponential |
//! | Adjacent overlapping repeats | `\d+\d+`, `.*.*` | polynomial |
//! | Unanchored leading repeat that can fail afterwards | `\s+$` | polynomial |
//!
//! The analysis is a heuristic: it over-approximates character sets and may
//! report a pattern as vulnerable when no engine would actually struggle.
//! It never executes the pattern.
//!
//! # Example
//!
//! ```rust
//! use rechk_domain::analyzer::analyze;
//! use rechk_domain::checker::CheckStatus;
//!
//! let result = analyze("^(a+)+$", "");
//! assert_eq!(result.status, CheckStatus::Vulnerable);
//! assert_eq!(result.details["complexity"]["type"], "exponential");
//!
//! assert_eq!(analyze("^[a-z]+$", "i").status, CheckStatus::Safe);
//! ```

mod ast;
mod detect;
mod parser;


use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::checker::{CheckOptions, CheckResult, CheckStatus, RegexChecker};
use crate::error::{CheckerError, CheckerResult};

use detect::{Complexity, Finding};
use parser::ParseError;

/// Number of pump repetitions in an exponential attack string.
const EXPONENTIAL_ATTACK_BASE: usize = 30;

/// Number of pump repetitions in a polynomial attack string.
const POLYNOMIAL_ATTACK_BASE: usize = 1_000;

const CHECKER_NAME: &str = "static";

const VALID_FLAGS: &str = "dgimsuyv";

/// Parsed regex modifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Flags {
    pub ignore_case: bool,
    /// `u` or `v`.
    pub unicode: bool,
    pub unicode_sets: bool,
    pub sticky: bool,
}

impl Flags {
    pub fn parse(modifier: &str) -> Result<Self, String> {
        let mut flags = Flags::default();
        let mut seen = String::new();
        for c in modifier.chars() {
            if !VALID_FLAGS.contains(c) {
                return Err(format!("unknown flag '{c}'"));
            }
            if seen.contains(c) {
                return Err(format!("duplicated flag '{c}'"));
            }
            seen.push(c);
            match c {
                'i' => flags.ignore_case = true,
                'u' => flags.unicode = true,
                'v' => {
                    flags.unicode = true;
                    flags.unicode_sets = true;
                }
                'y' => flags.sticky = true,
                _ => {}
            }
        }
        if seen.contains('u') && seen.contains('v') {
            return Err("flags 'u' and 'v' cannot be combined".to_string());
        }
        Ok(flags)
    }
}

/// Analyzes a pattern synchronously.
///
/// `pattern` is used as given; callers trim it beforehand. The result is
/// always returned in-band: invalid input yields `status: "unknown"` with an
/// `error` detail rather than an `Err`.
pub fn analyze(pattern: &str, modifier: &str) -> CheckResult {
    let flags = match Flags::parse(modifier) {
        Ok(flags) => flags,
        Err(message) => return unknown(pattern, modifier, "invalid", message),
    };

    let root = match parser::parse(pattern, &flags) {
        Ok(root) => root,
        Err(err @ ParseError::Syntax { .. }) => {
            return unknown(pattern, modifier, "invalid", err.to_string())
        }
        Err(err @ ParseError::TooDeep) => {
            return unknown(pattern, modifier, "unsupported", err.to_string())
        }
    };

    let findings = detect::detect(&root, &flags);
    let Some(primary) = findings.first() else {
        return base_result(pattern, modifier, CheckStatus::Safe).with_detail(
            "complexity",
            json!({"type": "safe", "summary": "safe", "isFuzz": false}),
        );
    };

    let (complexity, base) = match primary.complexity {
        Complexity::Exponential => (
            json!({"type": "exponential", "summary": "exponential", "isFuzz": false}),
            EXPONENTIAL_ATTACK_BASE,
        ),
        Complexity::Polynomial => (
            json!({
                "type": "polynomial",
                "degree": 2,
                "summary": "2nd degree polynomial",
                "isFuzz": false
            }),
            POLYNOMIAL_ATTACK_BASE,
        ),
    };

    let hotspot: Vec<Value> = findings
        .iter()
        .map(|f| json!({"start": f.span.start, "end": f.span.end, "temperature": "heat"}))
        .collect();

    base_result(pattern, modifier, CheckStatus::Vulnerable)
        .with_detail("complexity", complexity)
        .with_detail("attack", attack(&root, primary, base))
        .with_detail("hotspot", Value::Array(hotspot))
}

fn attack(root: &ast::Node, finding: &Finding, base: usize) -> Value {
    let prefix: String = root
        .sequence()
        .into_iter()
        .take_while(|node| node.span.end <= finding.span.start)
        .map(detect::sample_string)
        .collect();
    let suffix = detect::pump_chars(&finding.pump)
        .sample_outside()
        .map(String::from)
        .unwrap_or_default();

    let mut string = String::with_capacity(prefix.len() + finding.pump.len() * base + suffix.len());
    string.push_str(&prefix);
    for _ in 0..base {
        string.push_str(&finding.pump);
    }
    string.push_str(&suffix);

    json!({
        "prefix": prefix,
        "pump": finding.pump,
        "suffix": suffix,
        "base": base,
        "string": string,
    })
}

fn base_result(pattern: &str, modifier: &str, status: CheckStatus) -> CheckResult {
    CheckResult::new(status)
        .with_detail("source", pattern)
        .with_detail("flags", modifier)
        .with_detail("checker", CHECKER_NAME)
}

fn unknown(pattern: &str, modifier: &str, kind: &str, message: String) -> CheckResult {
    base_result(pattern, modifier, CheckStatus::Unknown)
        .with_detail("error", json!({"kind": kind, "message": message}))
}

/// Checker running [`analyze`] on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticChecker;

impl StaticChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RegexChecker for StaticChecker {
    async fn check(
        &self,
        pattern: &str,
        modifier: &str,
        options: &CheckOptions,
    ) -> CheckerResult<CheckResult> {
        let owned_pattern = pattern.to_string();
        let owned_modifier = modifier.to_string();
        let task =
            tokio::task::spawn_blocking(move || analyze(&owned_pattern, &owned_modifier));

        match tokio::time::timeout(options.timeout, task).await {
            Ok(Ok(result)) => {
                debug!(status = %result.status, pattern_len = pattern.len(), "static analysis done");
                Ok(result)
            }
            Ok(Err(join_error)) => Err(CheckerError::Panicked {
                message: join_error.to_string(),
            }),
            Err(_) => Err(CheckerError::Timeout {
                duration_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn name(&self) -> &'static str {
        CHECKER_NAME
    }
}
