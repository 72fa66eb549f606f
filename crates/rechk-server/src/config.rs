//! Configuration management for the rechk service.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults. The plain `PORT` variable is applied
//! last so the service can run on platforms that inject it.
//!
//! # Example
//!
//! ```ignore
//! use rechk_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use rechk_domain::cache::{ResultCacheConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_TRIM_CHUNK};
use rechk_domain::checker::CheckOptions;
use serde::{Deserialize, Serialize};

use crate::handlers::batch::{BatchLimits, MAX_BATCH_SIZE, MAX_PATTERN_LENGTH};

/// Prefix for environment overrides, e.g. `RECHK_SERVER__PORT`.
pub const ENV_PREFIX: &str = "RECHK";

/// Plain environment variable overriding `server.port`.
pub const PORT_ENV: &str = "PORT";

/// Checker backends accepted in `checker.backend`.
pub const CHECKER_BACKENDS: [&str; 2] = ["static", "command"];

/// Paths served by the service itself.
pub const RESERVED_PATHS: [&str; 2] = ["/", "/recheck"];

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Checker backend settings
    #[serde(default)]
    pub checker: CheckerSettings,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Request limits
    #[serde(default)]
    pub limits: LimitSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long an idle keep-alive connection is kept open, in seconds
    #[serde(default = "default_timeout_secs")]
    pub keep_alive_timeout_secs: u64,

    /// Time allowed to receive the request headers, in seconds
    #[serde(default = "default_timeout_secs")]
    pub header_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keep_alive_timeout_secs: default_timeout_secs(),
            header_timeout_secs: default_timeout_secs(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ServerSettings {
    /// Returns `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_secs(self.header_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_body_limit() -> usize {
    4 * 1024 * 1024
}

/// Checker backend settings.
///
/// # Example YAML Configuration
///
/// ```yaml
/// checker:
///   backend: command
///   timeout_secs: 30
///   command: /usr/local/bin/recheck-json
///   args: ["--mode", "hybrid"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CheckerSettings {
    /// Backend: "static" (built-in analyzer) or "command" (external program)
    #[serde(default = "default_checker_backend")]
    pub backend: String,

    /// Time budget for one check, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Program to run (required if backend is "command")
    pub command: Option<String>,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            backend: default_checker_backend(),
            timeout_secs: default_timeout_secs(),
            command: None,
            args: Vec::new(),
        }
    }
}

impl CheckerSettings {
    /// Options passed to every check.
    pub fn check_options(&self) -> CheckOptions {
        CheckOptions::default().with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

fn default_checker_backend() -> String {
    "static".to_string()
}

/// Result cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Size above which the cache is trimmed
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Number of oldest entries removed per trim
    #[serde(default = "default_trim_chunk")]
    pub trim_chunk: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            high_water_mark: default_high_water_mark(),
            trim_chunk: default_trim_chunk(),
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> ResultCacheConfig {
        ResultCacheConfig::default()
            .with_high_water_mark(self.high_water_mark)
            .with_trim_chunk(self.trim_chunk)
    }
}

fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

fn default_trim_chunk() -> usize {
    DEFAULT_TRIM_CHUNK
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LimitSettings {
    /// Maximum number of expressions per request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum trimmed pattern length, in UTF-16 code units
    #[serde(default = "default_max_pattern_length")]
    pub max_pattern_length: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_pattern_length: default_max_pattern_length(),
        }
    }
}

impl LimitSettings {
    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_batch_size: self.max_batch_size,
            max_pattern_length: self.max_pattern_length,
        }
    }
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_max_pattern_length() -> usize {
    MAX_PATTERN_LENGTH
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Serve Prometheus metrics
    #[serde(default)]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigLoadError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RECHK_` and use `__` as separator.
    /// For example:
    /// - `RECHK_SERVER__PORT=9090` overrides `server.port`
    /// - `RECHK_CHECKER__BACKEND=command` overrides `checker.backend`
    ///
    /// `PORT` overrides `server.port` after everything else.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let builder = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml));

        Self::finish(builder)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let builder = Config::builder().add_source(Config::try_from(&ServerConfig::default())?);

        Self::finish(builder)
    }

    fn finish(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigLoadError> {
        let config = builder
            // RECHK_SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("checker.args")
                    .try_parsing(true),
            )
            .build()?;

        let mut server_config: ServerConfig = config.try_deserialize()?;
        server_config.apply_port_override(std::env::var(PORT_ENV).ok().as_deref())?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Applies the value of the `PORT` environment variable, if any.
    pub fn apply_port_override(&mut self, port: Option<&str>) -> Result<(), ConfigLoadError> {
        let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) else {
            return Ok(());
        };
        self.server.port = port
            .parse()
            .map_err(|_| ConfigLoadError::invalid(format!("{PORT_ENV} must be a port number, got: {port}")))?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(ConfigLoadError::invalid("server.port must be greater than 0"));
        }
        if self.server.keep_alive_timeout_secs == 0 || self.server.header_timeout_secs == 0 {
            return Err(ConfigLoadError::invalid(
                "server timeouts must be greater than 0",
            ));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigLoadError::invalid(
                "server.body_limit_bytes must be greater than 0",
            ));
        }

        if !CHECKER_BACKENDS.contains(&self.checker.backend.as_str()) {
            return Err(ConfigLoadError::invalid(format!(
                "checker.backend must be one of: {:?}, got: {}",
                CHECKER_BACKENDS, self.checker.backend
            )));
        }
        if self.checker.backend == "command"
            && self
                .checker
                .command
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigLoadError::invalid(
                "checker.command is required when backend is 'command'",
            ));
        }
        if self.checker.timeout_secs == 0 {
            return Err(ConfigLoadError::invalid(
                "checker.timeout_secs must be greater than 0",
            ));
        }

        if self.cache.trim_chunk == 0 {
            return Err(ConfigLoadError::invalid(
                "cache.trim_chunk must be greater than 0",
            ));
        }

        if self.limits.max_batch_size == 0 || self.limits.max_pattern_length == 0 {
            return Err(ConfigLoadError::invalid("limits must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        if !self.metrics.path.starts_with('/') {
            return Err(ConfigLoadError::invalid(format!(
                "metrics.path must start with '/', got: {}",
                self.metrics.path
            )));
        }
        if RESERVED_PATHS.contains(&self.metrics.path.as_str()) {
            return Err(ConfigLoadError::invalid(format!(
                "metrics.path must not shadow a service route, got: {}",
                self.metrics.path
            )));
        }

        Ok(())
    }
}
