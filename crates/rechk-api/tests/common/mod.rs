//! Shared test utilities for rechk API tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Map, Value};
use tower::ServiceExt;

use rechk_api::http::{create_router, AppState};
use rechk_domain::cache::{ResultCache, ResultCacheConfig};
use rechk_domain::checker::{CheckOptions, CheckResult, CheckStatus, RegexChecker};
use rechk_domain::error::CheckerResult;
use rechk_domain::StaticChecker;

/// Number of concurrent clients for concurrency tests.
pub const CONCURRENT_CLIENT_COUNT: usize = 50;

/// Checker that counts calls and sleeps before answering.
///
/// Patterns starting with `slow` sleep for `slow_delay`; everything else
/// answers immediately with `safe`.
pub struct CountingChecker {
    calls: AtomicUsize,
    slow_delay: Duration,
}

impl CountingChecker {
    pub fn new(slow_delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            slow_delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegexChecker for CountingChecker {
    async fn check(
        &self,
        pattern: &str,
        _modifier: &str,
        _options: &CheckOptions,
    ) -> CheckerResult<CheckResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if pattern.starts_with("slow") {
            tokio::time::sleep(self.slow_delay).await;
        }
        Ok(CheckResult::new(CheckStatus::Safe).with_detail("source", pattern))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Router backed by the built-in static analyzer.
pub fn static_app() -> Router {
    create_router(AppState::new(Arc::new(StaticChecker::new())))
}

/// Router backed by the static analyzer, plus a handle on its cache.
pub fn static_app_with_cache(cache_config: ResultCacheConfig) -> (Router, Arc<ResultCache>) {
    let state = AppState::with_cache_config(Arc::new(StaticChecker::new()), cache_config);
    let cache = Arc::clone(state.cache());
    (create_router(state), cache)
}

/// Router backed by a [`CountingChecker`].
pub fn counting_app(slow_delay: Duration) -> (Router, Arc<CountingChecker>) {
    let checker = Arc::new(CountingChecker::new(slow_delay));
    (create_router(AppState::new(Arc::clone(&checker))), checker)
}

/// Builds a `POST /recheck` request with a JSON content type.
pub fn recheck_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/recheck")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Builds a request body with one entry per `(key, pattern, modifier)`.
pub fn entries(items: &[(&str, &str, &str)]) -> Value {
    let map: Map<String, Value> = items
        .iter()
        .map(|(key, pattern, modifier)| {
            (key.to_string(), json!({"pattern": pattern, "modifier": modifier}))
        })
        .collect();
    Value::Object(map)
}

/// Builds a body of `n` distinct, safe patterns keyed `0..n`.
pub fn distinct_batch(n: usize, prefix: &str) -> Value {
    let map: Map<String, Value> = (0..n)
        .map(|i| {
            (
                i.to_string(),
                json!({"pattern": format!("{prefix}{i}"), "modifier": ""}),
            )
        })
        .collect();
    Value::Object(map)
}

/// Sends a request and decodes the JSON response body (or `Null`).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// POSTs `body` to `/recheck`.
pub async fn recheck(app: &Router, body: &Value) -> (StatusCode, Value) {
    send(app, recheck_request(body)).await
}
