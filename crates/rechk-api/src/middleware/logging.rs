//! Request logging middleware.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{info, warn};

use super::request_id::request_id_from;

/// Layer that logs the start and completion of every request.
#[derive(Clone, Default)]
pub struct RequestLoggingLayer;

impl RequestLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let request_id = request_id_from(request.headers())
            .unwrap_or("-")
            .to_string();

        info!(
            target: "rechk::http",
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "request started"
        );

        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(request).await?;
            let status = response.status();
            let duration_ms = start.elapsed().as_millis() as u64;

            if status.is_server_error() {
                warn!(
                    target: "rechk::http",
                    request_id = %request_id,
                    method = %method,
                    uri = %uri,
                    status = status.as_u16(),
                    duration_ms,
                    "request completed"
                );
            } else {
                info!(
                    target: "rechk::http",
                    request_id = %request_id,
                    method = %method,
                    uri = %uri,
                    status = status.as_u16(),
                    duration_ms,
                    "request completed"
                );
            }

            Ok(response)
        })
    }
}
