//! API middleware.
//!
//! Includes:
//! - Request ID generation and propagation
//! - Request logging
//! - Request tracing spans
//! - Metrics collection
//!
//! [`apply_middleware`] stacks them in the order the service expects.

mod logging;
mod metrics;
mod request_id;
mod tracing_layer;

use std::sync::Arc;

use axum::Router;

pub use logging::RequestLoggingLayer;
pub use metrics::{MetricsLayer, RequestMetrics, UNMATCHED_PATH};
pub use request_id::{request_id_from, RequestIdLayer, MAX_REQUEST_ID_LEN, REQUEST_ID_HEADER};
pub use tracing_layer::TracingLayer;

/// Wraps every route (and the fallback) of `router` in the request middleware.
///
/// The last `.layer()` is the outermost, so the request ID is assigned
/// before metrics, spans and logs see the request.
pub fn apply_middleware(router: Router, metrics: Arc<RequestMetrics>) -> Router {
    router
        .layer(RequestLoggingLayer::new())
        .layer(TracingLayer::new())
        .layer(MetricsLayer::new(metrics))
        .layer(RequestIdLayer::new())
}
