//! Wiring from configuration to a ready router.

use std::sync::Arc;

use axum::Router;
use rechk_domain::cache::ResultCache;
use rechk_domain::checker::RegexChecker;
use rechk_server::handlers::batch::BatchCheckHandler;
use rechk_server::{ConfigLoadError, ConfiguredChecker, ServerConfig};
use tracing::info;

use crate::http::{create_router_with_body_limit, create_router_with_observability, AppState};
use crate::observability::MetricsState;

/// Builds the checker, cache and batch handler described by `config`.
pub fn build_state(config: &ServerConfig) -> Result<AppState<ConfiguredChecker>, ConfigLoadError> {
    let checker = Arc::new(ConfiguredChecker::from_settings(&config.checker)?);
    let cache = Arc::new(ResultCache::new(config.cache.cache_config()));
    let handler =
        BatchCheckHandler::new(checker, cache).with_options(config.checker.check_options());

    info!(
        checker = handler.checker().name(),
        timeout_secs = config.checker.timeout_secs,
        high_water_mark = config.cache.high_water_mark,
        trim_chunk = config.cache.trim_chunk,
        "checker ready"
    );

    Ok(AppState::from_handler(handler).with_limits(config.limits.batch_limits()))
}

/// Builds the full router, serving metrics only when `metrics_state` is set.
pub fn build_router(
    config: &ServerConfig,
    metrics_state: Option<MetricsState>,
) -> Result<Router, ConfigLoadError> {
    let state = build_state(config)?;
    let body_limit = config.server.body_limit_bytes;

    Ok(match metrics_state {
        Some(metrics_state) => create_router_with_observability(
            state,
            metrics_state,
            &config.metrics.path,
            body_limit,
        ),
        None => create_router_with_body_limit(state, body_limit),
    })
}
