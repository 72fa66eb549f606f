//! Checker backend selected by configuration.

use async_trait::async_trait;
use rechk_domain::checker::{
    CheckOptions, CheckResult, CommandChecker, CommandCheckerConfig, RegexChecker,
};
use rechk_domain::error::CheckerResult;
use rechk_domain::StaticChecker;

use crate::config::{CheckerSettings, ConfigLoadError};

/// The checker the service runs with.
#[derive(Debug, Clone)]
pub enum ConfiguredChecker {
    Static(StaticChecker),
    Command(CommandChecker),
}

impl ConfiguredChecker {
    /// Builds the backend named in `settings.backend`.
    pub fn from_settings(settings: &CheckerSettings) -> Result<Self, ConfigLoadError> {
        match settings.backend.as_str() {
            "static" => Ok(Self::Static(StaticChecker::new())),
            "command" => {
                let program = settings
                    .command
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| ConfigLoadError::Invalid {
                        message: "checker.command is required when backend is 'command'"
                            .to_string(),
                    })?;
                Ok(Self::Command(CommandChecker::new(
                    CommandCheckerConfig::new(program).with_args(settings.args.iter().cloned()),
                )))
            }
            other => Err(ConfigLoadError::Invalid {
                message: format!("unknown checker backend: {other}"),
            }),
        }
    }
}

#[async_trait]
impl RegexChecker for ConfiguredChecker {
    async fn check(
        &self,
        pattern: &str,
        modifier: &str,
        options: &CheckOptions,
    ) -> CheckerResult<CheckResult> {
        match self {
            Self::Static(checker) => checker.check(pattern, modifier, options).await,
            Self::Command(checker) => checker.check(pattern, modifier, options).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Static(checker) => checker.name(),
            Self::Command(checker) => checker.name(),
        }
    }
}
