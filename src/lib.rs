pub mod bridge;
pub mod config;
pub mod http;
pub mod mcp_client;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use bridge::BridgeService;

/// Initialize the tracing subscriber. Logs go to stderr.
///
/// `RUST_LOG` wins over `log_level`. An unparsable filter falls back to
/// [`config::DEFAULT_LOG_LEVEL`]. Output is human-readable on a terminal
/// and JSON otherwise.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_LEVEL));

    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Serve the HTTP surface until `shutdown` fires, then drain the service.
///
/// In-flight requests finish before the backends are closed. The service is
/// shut down even when the server itself fails.
pub async fn run(
    service: Arc<BridgeService>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = http::create_router(Arc::clone(&service));

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    tracing::info!("HTTP server stopped, closing backends");
    service.shutdown().await;

    served.context("HTTP server failed")
}

/// Wait for Ctrl+C or SIGTERM, then cancel `token`.
///
/// A signal that cannot be installed is logged and never fires.
pub async fn wait_for_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    token.cancel();
}
