//! Orchestrator service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gateway::telemetry::{init_tracing, shutdown_signal};
use gateway::GatewayClient;
use orchestrator::{router, Orchestrator, OrchestratorConfig};

/// Orchestrator - turns requests into multi-step workflows.
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Classify requests and run fleet workflows against the tool gateway")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "ORCHESTRATOR_CONFIG_PATH", default_value = "/config/orchestrator.yaml")]
    config: String,

    /// Override the listen address.
    #[arg(long, env = "ORCHESTRATOR_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Override the tool gateway base URL.
    #[arg(long, env = "GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let mut config = OrchestratorConfig::load(Some(&cli.config));
    if let Some(addr) = cli.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(url) = cli.gateway_url {
        config.gateway_url = url;
    }
    config.validate().context("invalid orchestrator configuration")?;

    let client = GatewayClient::with_timeout(&config.gateway_url, config.gateway_timeout())
        .context("failed to build gateway client")?;
    info!("Using tool gateway at {}", client.execute_url());

    let orchestrator = Orchestrator::new(Arc::new(client), config.workflow_settings())
        .context("failed to build workflow catalog")?;
    for definition in orchestrator.workflows() {
        info!(workflow = %definition.name, steps = definition.steps.len(), "Registered workflow");
    }

    let app = router(orchestrator, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Orchestrator listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("orchestrator server failed")?;

    info!("Orchestrator stopped");
    Ok(())
}
