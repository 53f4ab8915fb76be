use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use mcp_tool_bridge::bridge::BridgeService;
use mcp_tool_bridge::config::{BridgeConfig, CliArgs};
use mcp_tool_bridge::mcp_client::StdioLauncher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let config = BridgeConfig::load(cli).context("failed to load configuration")?;

    // Tracing FIRST, before any tracing::info!() calls
    mcp_tool_bridge::init_tracing(&config.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind,
        backends = config.backends.len(),
        pid = std::process::id(),
        "=== MCP tool bridge starting ==="
    );

    let launcher = StdioLauncher::new(config.timeouts);
    let (service, report) = BridgeService::start(&config.backends, &launcher).await;
    let service = Arc::new(service);
    if report.started.is_empty() && report.attempted > 0 {
        tracing::warn!("no backend started, serving an empty tool catalog");
    }

    let listener = match TcpListener::bind(&config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            service.shutdown().await;
            return Err(e).with_context(|| format!("failed to bind {}", config.bind));
        }
    };
    let addr = listener.local_addr().context("failed to read bound address")?;
    tracing::info!(%addr, "Server started successfully");

    let shutdown = CancellationToken::new();
    tokio::spawn(mcp_tool_bridge::wait_for_shutdown_signal(shutdown.clone()));

    mcp_tool_bridge::run(service, listener, shutdown).await
}
