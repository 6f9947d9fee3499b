//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::service::{HashService, HashTask};

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// If true, ignore SIGTERM and wait for explicit /shutdown or SIGINT.
    pub await_explicit_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            await_explicit_shutdown: false,
        }
    }
}

/// Start the HTTP server with provided service.
///
/// The server places no limit on concurrent requests; admission control
/// happens inside the service. Once a shutdown signal arrives the service
/// stops admitting before axum drains open connections, so requests still
/// waiting for a slot fail instead of being served during the drain.
pub async fn serve<T: HashTask>(
    config: ServerConfig,
    service: Arc<HashService<T>>,
) -> anyhow::Result<()> {
    let signal = shutdown_signal(config.await_explicit_shutdown, service.shutdown_rx());
    let app = routes(Arc::clone(&service));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Starting hashgate server on {}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(close_on(signal, service))
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// Close admission on `service` once `signal` resolves.
async fn close_on<T: HashTask>(signal: impl Future<Output = ()>, service: Arc<HashService<T>>) {
    signal.await;
    service.trigger_shutdown();
}

/// Resolve on SIGINT, SIGTERM (unless `await_explicit_shutdown`), or the
/// `/shutdown` endpoint flipping `shutdown_rx`.
///
/// # Panics
///
/// Panics if tokio cannot register a signal listener. That only happens
/// when the runtime was built without its signal driver, which
/// `#[tokio::main]` always enables.
async fn shutdown_signal(await_explicit_shutdown: bool, mut shutdown_rx: watch::Receiver<bool>) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            panic!("cannot listen for SIGINT: {e}");
        }
    };

    let terminate = async {
        if await_explicit_shutdown {
            info!("await_explicit_shutdown enabled, ignoring SIGTERM");
            std::future::pending::<()>().await;
        }
        sigterm().await;
    };

    let requested = async {
        let closed = shutdown_rx.wait_for(|stop| *stop).await.is_err();
        // A closed channel means the service is gone; only signals remain.
        if closed {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = requested => info!("Shutdown requested via /shutdown"),
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => panic!("cannot listen for SIGTERM: {e}"),
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await
}
