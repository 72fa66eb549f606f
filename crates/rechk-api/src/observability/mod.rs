//! Observability infrastructure for rechk.
//!
//! This module provides:
//! - Structured logging configuration
//! - Prometheus recorder setup and the metrics endpoint

mod logging;
mod metrics;

pub use logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
pub use metrics::{init_metrics, metrics_handler, MetricsError, MetricsState};
