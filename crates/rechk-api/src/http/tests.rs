//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

use rechk_domain::checker::{CheckOptions, CheckResult, CheckStatus, RegexChecker};
use rechk_domain::error::{CheckerError, CheckerResult};
use rechk_server::handlers::batch::BatchLimits;

use super::routes::{
    create_router, create_router_with_body_limit, create_router_with_observability,
};
use super::state::AppState;
use crate::middleware::REQUEST_ID_HEADER;
use crate::observability::MetricsState;

/// Checker that answers by pattern: `unknown*` → unknown, `fail*` → error,
/// `evil*` → vulnerable, anything else → safe.
#[derive(Default)]
struct ScriptedChecker {
    calls: AtomicUsize,
}

impl ScriptedChecker {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegexChecker for ScriptedChecker {
    async fn check(
        &self,
        pattern: &str,
        modifier: &str,
        _options: &CheckOptions,
    ) -> CheckerResult<CheckResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = if pattern.starts_with("fail") {
            return Err(CheckerError::InvalidOutput {
                message: "scripted failure".to_string(),
            });
        } else if pattern.starts_with("unknown") {
            CheckStatus::Unknown
        } else if pattern.starts_with("evil") {
            CheckStatus::Vulnerable
        } else {
            CheckStatus::Safe
        };
        Ok(CheckResult::new(status)
            .with_detail("source", pattern)
            .with_detail("flags", modifier))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn test_app() -> (Router, Arc<ScriptedChecker>) {
    let checker = Arc::new(ScriptedChecker::default());
    let app = create_router(AppState::new(Arc::clone(&checker)));
    (app, checker)
}

fn post_json(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/recheck")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn batch(n: usize) -> String {
    let map: serde_json::Map<String, Value> = (0..n)
        .map(|i| (i.to_string(), json!({"pattern": format!("a{i}"), "modifier": ""})))
        .collect();
    Value::Object(map).to_string()
}

// ============================================================
// Section 1: Usage and routing
// ============================================================

#[tokio::test]
async fn test_root_serves_usage_text() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("/recheck"));
    assert!(text.contains("500 expressions"));
    assert!(text.contains("1000 characters"));
    assert!(text.contains("null"));
    assert!(text.contains("415"));
}

#[tokio::test]
async fn test_usage_text_reflects_configured_limits() {
    let checker = Arc::new(ScriptedChecker::default());
    let state = AppState::new(checker).with_limits(BatchLimits {
        max_batch_size: 20,
        max_pattern_length: 64,
    });
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("at most 20 expressions"));
    assert!(text.contains("at most 64 characters"));
}

#[tokio::test]
async fn test_get_recheck_is_method_not_allowed() {
    let (app, _) = test_app();

    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/recheck")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(body, json!({"error": "Method Not Allowed"}));
    }
}

#[tokio::test]
async fn test_non_get_root_is_not_found() {
    let (app, _) = test_app();

    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND, "{method}");
        assert_eq!(body, json!({"error": "Not Found"}));
    }
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (app, _) = test_app();

    for uri in ["/unknown-path", "/recheck/extra", "/metrics"] {
        let (status, body) = send(
            &app,
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({"error": "Not Found"}));
    }
}

#[tokio::test]
async fn test_every_response_carries_request_id() {
    let (app, _) = test_app();

    let requests = [
        Request::builder().uri("/").body(Body::empty()).unwrap(),
        Request::builder().uri("/nope").body(Body::empty()).unwrap(),
        post_json("{}"),
        post_json("not json"),
    ];

    for request in requests {
        let response = app.clone().oneshot(request).await.unwrap();
        assert!(
            response.headers().contains_key(REQUEST_ID_HEADER),
            "missing request id on {}",
            response.status()
        );
    }
}

// ============================================================
// Section 2: Request validation
// ============================================================

#[tokio::test]
async fn test_missing_or_wrong_content_type_is_415() {
    let (app, checker) = test_app();

    let wrong = Request::builder()
        .method(Method::POST)
        .uri("/recheck")
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("{}"))
        .unwrap();
    let missing = Request::builder()
        .method(Method::POST)
        .uri("/recheck")
        .body(Body::from("{}"))
        .unwrap();

    for request in [wrong, missing] {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["error"].is_string());
    }
    assert_eq!(checker.calls(), 0);
}

#[tokio::test]
async fn test_non_object_body_is_400() {
    let (app, _) = test_app();

    for body in [
        "[]",
        r#"[{"pattern": "a+", "modifier": ""}]"#,
        "\"a+\"",
        "42",
        "null",
        "true",
    ] {
        let (status, json) = send(&app, post_json(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(
            json,
            json!({"error": "Invalid JSON structure, or missing Content-Type: application/json header"})
        );
    }
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let (app, checker) = test_app();

    let (status, body) = send(&app, post_json(r#"{"1": {"pattern": "a+""#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(checker.calls(), 0);
}

#[tokio::test]
async fn test_batch_size_boundary() {
    let (app, _) = test_app();

    let (status, body) = send(&app, post_json(batch(500))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_object().unwrap().len(), 500);

    let (status, body) = send(&app, post_json(batch(501))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Greater than 500 expressions"}));
}

#[tokio::test]
async fn test_body_over_limit_is_413() {
    let checker = Arc::new(ScriptedChecker::default());
    let app = create_router_with_body_limit(AppState::new(Arc::clone(&checker)), 64);

    let (status, body) = send(&app, post_json(batch(10))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
    assert_eq!(checker.calls(), 0);
}

// ============================================================
// Section 3: Batch results
// ============================================================

#[tokio::test]
async fn test_single_entry_is_checked() {
    let (app, checker) = test_app();

    let (status, body) = send(&app, post_json(r#"{"1": {"pattern": "a+", "modifier": ""}}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"1": {"status": "safe", "source": "a+", "flags": ""}})
    );
    assert_eq!(checker.calls(), 1);
}

#[tokio::test]
async fn test_invalid_entries_are_null() {
    let (app, checker) = test_app();
    let long = "a".repeat(1001);
    let request = json!({
        "num": {"pattern": 5, "modifier": ""},
        "nomod": {"pattern": "a"},
        "scalar": "a+",
        "long": {"pattern": long, "modifier": ""},
        "ok": {"pattern": "  evil  ", "modifier": "i"},
    });

    let (status, body) = send(&app, post_json(request.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "num": null,
            "nomod": null,
            "scalar": null,
            "long": null,
            "ok": {"status": "vulnerable", "source": "evil", "flags": "i"},
        })
    );
    assert_eq!(checker.calls(), 1);
}

#[tokio::test]
async fn test_response_preserves_key_order() {
    let (app, _) = test_app();
    let body = r#"{"z": {"pattern": "a", "modifier": ""}, "a": {"pattern": "b", "modifier": ""}, "m": 1}"#;

    let response = app.oneshot(post_json(body)).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let z = text.find("\"z\"").unwrap();
    let a = text.find("\"a\"").unwrap();
    let m = text.find("\"m\"").unwrap();
    assert!(z < a && a < m, "order not preserved: {text}");
}

#[tokio::test]
async fn test_failed_check_is_null_for_that_entry_only() {
    let (app, _) = test_app();
    let request = json!({
        "bad": {"pattern": "fail-me", "modifier": ""},
        "good": {"pattern": "abc", "modifier": ""},
    });

    let (status, body) = send(&app, post_json(request.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bad"], Value::Null);
    assert_eq!(body["good"]["status"], "safe");
}

#[tokio::test]
async fn test_repeat_requests_are_served_from_cache() {
    let (app, checker) = test_app();
    let body = r#"{"1": {"pattern": "evil", "modifier": ""}}"#;

    let (_, first) = send(&app, post_json(body)).await;
    let (_, second) = send(&app, post_json(body)).await;

    assert_eq!(first, second);
    assert_eq!(checker.calls(), 1);
}

#[tokio::test]
async fn test_unknown_results_are_rechecked() {
    let (app, checker) = test_app();
    let body = r#"{"1": {"pattern": "unknown", "modifier": ""}}"#;

    let (_, first) = send(&app, post_json(body)).await;
    let (_, second) = send(&app, post_json(body)).await;

    assert_eq!(first["1"]["status"], "unknown");
    assert_eq!(first, second);
    assert_eq!(checker.calls(), 2);
}

#[tokio::test]
async fn test_duplicates_in_one_batch_are_checked_once() {
    let (app, checker) = test_app();
    let request = json!({
        "1": {"pattern": "abc", "modifier": ""},
        "2": {"pattern": " abc", "modifier": ""},
        "3": {"pattern": "abc\n", "modifier": ""},
        "4": {"pattern": "abc", "modifier": "i"},
    });

    let (status, body) = send(&app, post_json(request.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["1"], body["2"]);
    assert_eq!(body["1"], body["3"]);
    assert_eq!(body["4"]["flags"], "i");
    assert_eq!(checker.calls(), 2);
}

// ============================================================
// Section 4: Metrics endpoint
// ============================================================

#[tokio::test]
async fn test_metrics_endpoint_when_enabled() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let metrics_state = MetricsState::new(recorder.handle());
    let app = create_router_with_observability(
        AppState::new(Arc::new(ScriptedChecker::default())),
        metrics_state,
        "/internal/metrics",
        super::DEFAULT_BODY_LIMIT,
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/internal/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    // The default path is not served when a custom one is configured.
    let (status, _) = send(
        &app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_counters_follow_responses() {
    let checker = Arc::new(ScriptedChecker::default());
    let state = AppState::new(checker);
    let counters = Arc::clone(&state.request_metrics);
    let app = create_router(state);

    send(&app, post_json("{}")).await;
    send(&app, post_json("[]")).await;
    send(
        &app,
        Request::builder().uri("/nope").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(counters.request_count(), 3);
    assert_eq!(counters.success_count(), 1);
    assert_eq!(counters.client_error_count(), 2);
}
