//! Checker backed by an external program.
//!
//! # Protocol
//!
//! For every check the program is spawned once. It receives a single JSON
//! line on stdin:
//!
//! ```json
//! {"pattern":"^(a|a)*$","modifier":"i","timeout":60000}
//! ```
//!
//! and must print one JSON object with at least a `status` field
//! (`safe`, `vulnerable` or `unknown`) on stdout, then exit with status 0.
//! A wrapper script around the `recheck` CLI is the intended counterpart.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{CheckOptions, CheckResult, RegexChecker};
use crate::error::{CheckerError, CheckerResult};

/// Maximum number of stderr bytes kept in error messages.
const MAX_STDERR_LEN: usize = 512;

/// Configuration for [`CommandChecker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheckerConfig {
    /// Program to execute.
    pub program: String,
    /// Extra arguments passed before any input.
    pub args: Vec<String>,
}

impl CommandCheckerConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Sets the program arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    pattern: &'a str,
    modifier: &'a str,
    timeout: u64,
}

/// Checker that runs an external program per check.
#[derive(Debug, Clone)]
pub struct CommandChecker {
    config: CommandCheckerConfig,
}

impl CommandChecker {
    pub fn new(config: CommandCheckerConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration for this checker.
    pub fn config(&self) -> &CommandCheckerConfig {
        &self.config
    }

    async fn run(&self, input: Vec<u8>) -> CheckerResult<CheckResult> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CheckerError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(&input).await?;
                stdin.write_all(b"\n").await
            }
            .await;
            // A program that exits without reading its input is judged by its output.
            match written {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
            // Dropping stdin closes the pipe so the program sees EOF.
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > MAX_STDERR_LEN {
                let mut cut = MAX_STDERR_LEN;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            return Err(CheckerError::ProcessFailed {
                code: output.status.code(),
                stderr,
            });
        }

        serde_json::from_slice::<CheckResult>(&output.stdout).map_err(|e| {
            CheckerError::InvalidOutput {
                message: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl RegexChecker for CommandChecker {
    async fn check(
        &self,
        pattern: &str,
        modifier: &str,
        options: &CheckOptions,
    ) -> CheckerResult<CheckResult> {
        let timeout_ms = duration_millis(options.timeout);
        let request = CommandRequest {
            pattern,
            modifier,
            timeout: timeout_ms,
        };
        let input = serde_json::to_vec(&request).map_err(|e| CheckerError::InvalidOutput {
            message: format!("failed to encode request: {e}"),
        })?;

        debug!(
            program = %self.config.program,
            pattern_len = pattern.len(),
            "running external checker"
        );

        // The child is killed on drop, so losing the race also stops the process.
        match tokio::time::timeout(options.timeout, self.run(input)).await {
            Ok(result) => result,
            Err(_) => Err(CheckerError::Timeout {
                duration_ms: timeout_ms,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::checker::CheckStatus;

    fn sh(script: &str) -> CommandChecker {
        CommandChecker::new(CommandCheckerConfig::new("sh").with_args(["-c", script]))
    }

    #[tokio::test]
    async fn test_parses_result_from_stdout() {
        let checker = sh(r#"cat > /dev/null; echo '{"status":"safe","checker":"automaton"}'"#);

        let result = checker
            .check("a+", "", &CheckOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, CheckStatus::Safe);
        assert_eq!(result.details["checker"], "automaton");
    }

    #[tokio::test]
    async fn test_sends_request_on_stdin() {
        // Echo the request back as the "source" detail.
        let checker = sh(r#"read line; printf '{"status":"unknown","request":%s}' "$line""#);

        let result = checker
            .check("^(a+)+$", "i", &CheckOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, CheckStatus::Unknown);
        assert_eq!(result.details["request"]["pattern"], "^(a+)+$");
        assert_eq!(result.details["request"]["modifier"], "i");
        assert_eq!(result.details["request"]["timeout"], 60_000);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_failure() {
        let checker = sh("cat > /dev/null; echo broken >&2; exit 3");

        let err = checker
            .check("a+", "", &CheckOptions::default())
            .await
            .unwrap_err();

        match err {
            CheckerError::ProcessFailed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_status_is_passed_through() {
        let checker = sh(r#"cat > /dev/null; echo '{"status":"error","reason":"oom"}'"#);

        let result = checker
            .check("a+", "", &CheckOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, CheckStatus::Other("error".to_string()));
        assert_eq!(result.to_value()["status"], "error");
        assert_eq!(result.details["reason"], "oom");
    }

    #[tokio::test]
    async fn test_garbage_output_is_invalid_output() {
        let checker = sh("cat > /dev/null; echo not-json");

        let err = checker
            .check("a+", "", &CheckOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckerError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let checker = CommandChecker::new(CommandCheckerConfig::new(
            "/nonexistent/rechk-checker-binary",
        ));

        let err = checker
            .check("a+", "", &CheckOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_slow_program_times_out() {
        let checker = sh("sleep 5");
        let options = CheckOptions::default().with_timeout(Duration::from_millis(100));

        let err = checker.check("a+", "", &options).await.unwrap_err();

        assert!(matches!(err, CheckerError::Timeout { duration_ms: 100 }));
    }
}
