//! rechk server binary
//!
//! Checks batches of regular expressions for catastrophic backtracking.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! rechk --config config.yaml
//!
//! # With environment variables only
//! RECHK_CHECKER__TIMEOUT_SECS=10 PORT=8080 rechk
//! ```

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use rechk_api::app::build_router;
use rechk_api::observability::{init_logging, init_metrics, LoggingConfig};
use rechk_api::server::{self, ConnectionSettings};
use rechk_server::ServerConfig;

/// rechk - ReDoS check service
#[derive(Parser, Debug)]
#[command(name = "rechk")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from_settings(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rechk server");

    let metrics_state = if config.metrics.enabled {
        let state = init_metrics()?;
        info!(path = %config.metrics.path, "Metrics enabled");
        Some(state)
    } else {
        None
    };

    let router = build_router(&config, metrics_state)?;

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.server.bind_address()))?;

    server::run(
        addr,
        router,
        ConnectionSettings::from(&config.server),
        server::shutdown_signal(),
    )
    .await?;

    Ok(())
}
