//! Tool gateway service.
//!
//! Serves the simulated platform toolset over JSON-RPC.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gateway::telemetry::{init_tracing, shutdown_signal};
use gateway::{register_platform_tools, router, Gateway, GatewayConfig, PlatformBackend};

/// Tool gateway - JSON-RPC dispatch for platform tools.
#[derive(Parser)]
#[command(name = "tool-gateway")]
#[command(about = "Serve platform tools behind a JSON-RPC endpoint")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "GATEWAY_CONFIG_PATH", default_value = "/config/gateway.yaml")]
    config: String,

    /// Override the listen address.
    #[arg(long, env = "GATEWAY_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Override the simulated training duration in seconds.
    #[arg(long, env = "GATEWAY_TRAINING_DURATION_SECS")]
    training_duration_secs: Option<u64>,

    /// Emit logs as JSON.
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting tool gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = GatewayConfig::load(Some(&cli.config));
    if let Some(addr) = cli.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(secs) = cli.training_duration_secs {
        config.training.simulated_duration_secs = secs;
    }
    config.validate().context("invalid gateway configuration")?;

    let gateway = Arc::new(Gateway::with_default_server(config.default_server.clone()));
    let backend = Arc::new(PlatformBackend::new(config.platform_settings()));
    register_platform_tools(&gateway, backend)
        .await
        .context("failed to register platform tools")?;

    let app = router(Arc::clone(&gateway), config.request_timeout());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Tool gateway listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server failed")?;

    info!("Tool gateway stopped");
    Ok(())
}
