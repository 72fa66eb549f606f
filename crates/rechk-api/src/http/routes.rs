//! HTTP route definitions and handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error};

use rechk_domain::checker::RegexChecker;
use rechk_server::handlers::batch::{validate_request, BatchCheckError, BatchLimits};

use super::state::AppState;
use crate::middleware::apply_middleware;
use crate::observability::{metrics_handler, MetricsState};

/// Default request body size limit (4 MiB).
///
/// 500 entries of 1000 characters each, JSON-escaped, fit comfortably.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Path of the batch check endpoint.
pub const RECHECK_PATH: &str = "/recheck";

// ============================================================
// Error Handling
// ============================================================

/// An error response: `{"error": "<message>"}` with the given status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 415 Unsupported Media Type.
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, message)
    }

    /// 413 Payload Too Large.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    /// 405 Method Not Allowed.
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    /// 404 Not Found.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    /// 500 Internal Server Error.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<BatchCheckError> for ApiError {
    fn from(err: BatchCheckError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(r) => Self::unsupported_media_type(r.body_text()),
            // Client mistakes; not worth more than a debug line.
            JsonRejection::JsonSyntaxError(r) => {
                debug!(error = %r.body_text(), "malformed JSON body");
                Self::bad_request(r.body_text())
            }
            JsonRejection::JsonDataError(r) => {
                debug!(error = %r.body_text(), "unusable JSON body");
                Self::bad_request(r.body_text())
            }
            other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Self::payload_too_large(other.body_text())
            }
            other => {
                error!(
                    status = other.status().as_u16(),
                    error = %other.body_text(),
                    "failed to read request body"
                );
                Self::internal_error("Failed to read request body")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON extractor whose rejections are [`ApiError`]s.
///
/// Accepts any JSON value; the shape is checked by the handler so that a
/// non-object body gets the service's own 400 message.
pub struct JsonBody(pub Value);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

// ============================================================
// Router construction
// ============================================================

/// Creates the HTTP router with the default body size limit (4 MiB).
pub fn create_router<C: RegexChecker + 'static>(state: AppState<C>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
pub fn create_router_with_body_limit<C: RegexChecker + 'static>(
    state: AppState<C>,
    body_limit: usize,
) -> Router {
    build_router(state, body_limit, None)
}

/// Creates the HTTP router plus a Prometheus endpoint at `metrics_path`.
pub fn create_router_with_observability<C: RegexChecker + 'static>(
    state: AppState<C>,
    metrics_state: MetricsState,
    metrics_path: &str,
    body_limit: usize,
) -> Router {
    build_router(state, body_limit, Some((metrics_state, metrics_path)))
}

fn build_router<C: RegexChecker + 'static>(
    state: AppState<C>,
    body_limit: usize,
    metrics: Option<(MetricsState, &str)>,
) -> Router {
    let request_metrics = Arc::clone(&state.request_metrics);

    let mut router = Router::new()
        .route("/", get(usage::<C>).fallback(not_found))
        .route(
            RECHECK_PATH,
            post(recheck::<C>).fallback(method_not_allowed),
        )
        .with_state(Arc::new(state));

    if let Some((metrics_state, path)) = metrics {
        router = router.merge(
            Router::new()
                .route(path, get(metrics_handler))
                .with_state(metrics_state),
        );
    }

    let router = router
        .fallback(not_found)
        // The tower-http limit is the only body limit in effect.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(axum::middleware::map_response(json_payload_too_large));

    apply_middleware(router, request_metrics)
}

// ============================================================
// Handlers
// ============================================================

/// Usage text served at `/`, reflecting the configured limits.
pub fn usage_text(limits: &BatchLimits) -> String {
    format!(
        r#"POST /recheck checks regular expressions for catastrophic backtracking (ReDoS).

Send a JSON object with Content-Type: application/json. Each key is a
string of your choosing; each value is an object with a "pattern" and a
"modifier" string (the flags, e.g. "i" or "" for none):

  {{"1": {{"pattern": "^(a+)+$", "modifier": ""}}, "2": {{"pattern": "\\d+", "modifier": "u"}}}}

The response is a JSON object with the same keys. Each value is the check
result for that expression, with a "status" of "safe", "vulnerable" or
"unknown" plus details such as "complexity", "attack" and "hotspot".

Limits:
  - at most {max_batch} expressions per request
  - at most {max_length} characters per expression (leading and trailing
    whitespace is ignored)

An entry that is malformed, too long, or could not be checked (timeout,
checker failure) maps to null instead of a result, e.g.
{{"1": {{"status": "vulnerable", ...}}, "2": null}}. Always check for null.

Errors:
  400 Bad Request            body is not a JSON object, is invalid JSON,
                             or has more than {max_batch} keys
  413 Payload Too Large      body exceeds the size limit
  415 Unsupported Media Type Content-Type is missing or not application/json
"#,
        max_batch = limits.max_batch_size,
        max_length = limits.max_pattern_length,
    )
}

async fn usage<C: RegexChecker + 'static>(State(state): State<Arc<AppState<C>>>) -> String {
    usage_text(&state.limits)
}

/// POST /recheck
async fn recheck<C: RegexChecker + 'static>(
    State(state): State<Arc<AppState<C>>>,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<Value>> {
    let request = validate_request(body, &state.limits)?;

    let (total, unique) = state.batch_handler.dedup_stats(&request);
    debug!(total, unique, "checking batch");

    let response = state.batch_handler.check(request).await;
    Ok(Json(response.into_json()))
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// Gives the body limit's early 413 the same JSON shape as other errors.
async fn json_payload_too_large(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::payload_too_large("length limit exceeded").into_response();
    }
    response
}
