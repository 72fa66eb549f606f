//! Application state for HTTP handlers.

use std::sync::Arc;

use rechk_domain::cache::{ResultCache, ResultCacheConfig};
use rechk_domain::checker::{CheckOptions, RegexChecker};
use rechk_server::handlers::batch::{BatchCheckHandler, BatchLimits};

use crate::middleware::RequestMetrics;

/// Application state shared across all HTTP handlers.
///
/// # Type Parameters
///
/// * `C` - The checker backend implementing `RegexChecker`
pub struct AppState<C: RegexChecker> {
    /// Batch handler owning the checker, the result cache and singleflight.
    pub batch_handler: Arc<BatchCheckHandler<C>>,
    /// Request size limits applied before any entry is checked.
    pub limits: BatchLimits,
    /// Per-status request counters fed by the metrics middleware.
    pub request_metrics: Arc<RequestMetrics>,
}

impl<C: RegexChecker + 'static> AppState<C> {
    /// Creates a state with a default result cache and default limits.
    pub fn new(checker: Arc<C>) -> Self {
        Self::with_cache_config(checker, ResultCacheConfig::default())
    }

    /// Creates a state with a custom result cache configuration.
    pub fn with_cache_config(checker: Arc<C>, cache_config: ResultCacheConfig) -> Self {
        let cache = Arc::new(ResultCache::new(cache_config));
        Self::from_handler(BatchCheckHandler::new(checker, cache))
    }

    /// Wraps an already configured batch handler.
    pub fn from_handler(handler: BatchCheckHandler<C>) -> Self {
        Self {
            batch_handler: Arc::new(handler),
            limits: BatchLimits::default(),
            request_metrics: Arc::new(RequestMetrics::new()),
        }
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Rebuilds the batch handler with new check options, keeping its
    /// checker and cache.
    pub fn with_check_options(self, options: CheckOptions) -> Self {
        let handler = BatchCheckHandler::new(
            Arc::clone(self.batch_handler.checker()),
            Arc::clone(self.batch_handler.cache()),
        )
        .with_options(options);
        Self {
            batch_handler: Arc::new(handler),
            ..self
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        self.batch_handler.cache()
    }
}
