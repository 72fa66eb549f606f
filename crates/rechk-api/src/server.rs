//! HTTP/1 accept loop.
//!
//! Connections are served by hyper directly (rather than `axum::serve`) so
//! the header read timeout and keep-alive behaviour can be set per
//! connection. On shutdown the listener is closed first, then every open
//! connection finishes its in-flight request and closes.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::Request, Router};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::rt::{TokioIo, TokioTimer};
use rechk_server::config::ServerSettings;
use tokio::{net::TcpListener, sync::watch, task::JoinSet};
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// Pause before retrying after an accept error that is not tied to a single
/// connection (e.g. EMFILE).
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Connection-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How long a client may take to send a complete request head. Also
    /// bounds how long an idle keep-alive connection waits for its next
    /// request.
    pub header_timeout: Duration,
    /// Upper bound on the idle time of a kept-alive connection.
    pub keep_alive_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            header_timeout: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ServerSettings> for ConnectionSettings {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            header_timeout: settings.header_timeout(),
            keep_alive_timeout: settings.keep_alive_timeout(),
        }
    }
}

impl ConnectionSettings {
    fn builder(&self) -> http1::Builder {
        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .keep_alive(true)
            // hyper starts the header timer as soon as it waits for a
            // request, so the shorter of the two bounds idle connections.
            .header_read_timeout(self.header_timeout.min(self.keep_alive_timeout));
        builder
    }
}

/// Binds `addr` and serves `router` until `shutdown` resolves.
pub async fn run(
    addr: SocketAddr,
    router: Router,
    settings: ConnectionSettings,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    serve(listener, router, settings, shutdown).await
}

/// Serves `router` on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    settings: ConnectionSettings,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    let builder = settings.builder();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        backoff_after_accept_error(&err).await;
                        continue;
                    }
                };

                let router = router.clone();
                let builder = builder.clone();
                let mut stop_rx = stop_rx.clone();

                connections.spawn(async move {
                    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                        router.clone().oneshot(request)
                    });
                    let connection = builder.serve_connection(TokioIo::new(stream), service);
                    tokio::pin!(connection);

                    let result = tokio::select! {
                        result = connection.as_mut() => result,
                        _ = stop_rx.changed() => {
                            connection.as_mut().graceful_shutdown();
                            connection.as_mut().await
                        }
                    };

                    if let Err(err) = result {
                        debug!(remote = %remote_addr, error = %err, "connection closed with error");
                    }
                });
            }
            // Reap finished connections.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    info!(open_connections = connections.len(), "HTTP server shutting down");

    let _ = stop_tx.send(true);
    while connections.join_next().await.is_some() {}

    info!("HTTP server shutdown complete");
    Ok(())
}

fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Skips a failed connection at once; any other accept error waits
/// [`ACCEPT_ERROR_BACKOFF`] so a persistent failure does not spin the loop.
async fn backoff_after_accept_error(err: &io::Error) {
    if is_connection_error(err) {
        debug!(error = %err, "connection failed before accept");
        return;
    }
    warn!(error = %err, backoff = ?ACCEPT_ERROR_BACKOFF, "failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
