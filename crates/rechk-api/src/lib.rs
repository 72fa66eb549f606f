//! rechk-api: HTTP layer for the rechk service
//!
//! This crate provides the outward-facing pieces:
//! - The `/` usage text and `/recheck` batch endpoint via Axum
//! - Middleware (request IDs, logging, tracing spans, metrics)
//! - Logging and Prometheus setup
//! - The HTTP/1 accept loop with connection timeouts and graceful shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 rechk-api                    │
//! ├─────────────────────────────────────────────┤
//! │  app.rs         - Config to router wiring   │
//! │  http/          - Routes, extractors, state │
//! │  middleware/    - Request ID, logs, metrics │
//! │  observability/ - Logging & Prometheus      │
//! │  server.rs      - hyper accept loop         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod http;
pub mod middleware;
pub mod observability;
pub mod server;
