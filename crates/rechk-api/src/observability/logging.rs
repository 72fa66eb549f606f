//! Structured logging configuration.
//!
//! With JSON output enabled every event is one JSON object per line:
//!
//! ```json
//! {"timestamp":"2026-01-15T10:30:00.000Z","level":"WARN","fields":{"message":"check timed out","key":"(a+)+$::"},"target":"rechk_server::handlers::batch::handler"}
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.

use rechk_server::config::LoggingSettings;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// JSON lines (true) or human-readable text (false)
    pub json_format: bool,
    /// The level used when RUST_LOG is not set
    pub default_level: Level,
    /// Whether to emit span enter/exit events
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Builds a logging configuration from the `logging` config section.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            json_format: settings.json,
            default_level: parse_log_level(&settings.level),
            include_spans: false,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }
}

/// Parses a log level name, falling back to INFO for anything unknown.
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber.
///
/// Returns false if a global subscriber was already set, in which case the
/// existing one stays in place.
pub fn init_logging(config: LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_span_events(span_events)
                .with_target(true),
        );
        tracing::subscriber::set_global_default(subscriber).is_ok()
    }
}

/// A JSON subscriber writing to `writer`, for capturing log output in tests.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}
