//! HTTP API endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/` | GET | Usage text |
//! | `/recheck` | POST | Batch ReDoS check |
//! | metrics path | GET | Prometheus metrics (when enabled) |
//!
//! Anything else is a JSON 404, and other methods on `/recheck` a JSON 405.

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability, usage_text,
    ApiError, ApiResult, JsonBody, DEFAULT_BODY_LIMIT, RECHECK_PATH,
};
pub use state::AppState;

#[cfg(test)]
mod tests;
