//! Prometheus metrics infrastructure.
//!
//! # Metrics Exposed
//!
//! - `rechk_http_requests_total` - HTTP requests by method, path, status class
//! - `rechk_http_request_duration_seconds` - HTTP request duration histogram
//! - `rechk_checks_total` - Checker invocations by outcome
//! - `rechk_check_duration_seconds` - Checker duration histogram
//! - `rechk_cache_hits_total` / `rechk_cache_misses_total` - Result cache lookups
//! - `rechk_cache_evictions_total` - Entries removed by trimming
//! - `rechk_cache_entries` - Current result cache size

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared handle used to render the Prometheus exposition.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder and describes all rechk metrics.
///
/// Must be called at most once per process.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    metrics::describe_counter!("rechk_http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "rechk_http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );

    rechk_domain::cache::register_result_cache_metrics();
    rechk_server::handlers::batch::register_batch_metrics();
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the metrics endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Installing a recorder is process-global, so these tests only build
    // local recorders.

    #[test]
    fn test_local_recorder_renders_recorded_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("rechk_checks_total", "outcome" => "completed").increment(3);
        });

        let output = state.clone().render();
        assert!(
            output.contains("rechk_checks_total{outcome=\"completed\"} 3"),
            "unexpected exposition: {output}"
        );
    }

    #[test]
    fn test_empty_recorder_renders_without_panicking() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        let _ = state.render();
    }
}
