//! Fleet agent - serves background training, deployment and cost requests.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agents::{
    AgentConfig, BackgroundAgent, CostHandler, CostMonitor, DeploymentHandler, MessageBus,
    NatsBus, TrainingHandler,
};
use gateway::telemetry::{init_tracing, shutdown_signal};
use gateway::{GatewayClient, ToolInvoker};

/// Fleet agent - answers bus requests by calling the tool gateway.
#[derive(Parser)]
#[command(name = "fleet-agent")]
#[command(about = "Run background agents for training, deployment and cost")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "AGENT_CONFIG_PATH", default_value = "/config/agent.yaml")]
    config: String,

    /// Override the NATS server URL.
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// Override the tool gateway base URL.
    #[arg(long, env = "GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Serve `agent.training`.
    Training,

    /// Serve `agent.deployment`.
    Deployment,

    /// Serve `agent.cost` and run the periodic cost monitor.
    Cost,

    /// Serve every channel from one process.
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting fleet agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AgentConfig::load(Some(&cli.config));
    if let Some(url) = cli.nats_url {
        config.nats_url = url;
    }
    if let Some(url) = cli.gateway_url {
        config.gateway_url = url;
    }
    config.validate().context("invalid agent configuration")?;

    let bus: Arc<dyn MessageBus> = Arc::new(
        NatsBus::connect(&config.nats_url)
            .await
            .context("failed to connect to message bus")?,
    );
    let invoker: Arc<dyn ToolInvoker> = Arc::new(
        GatewayClient::with_timeout(&config.gateway_url, config.gateway_timeout())
            .context("failed to build gateway client")?,
    );

    let shutdown = CancellationToken::new();
    let mut agents = JoinSet::new();

    if matches!(cli.command, Commands::Training | Commands::All) {
        let agent = BackgroundAgent::new(
            TrainingHandler::new(Arc::clone(&invoker), config.training_poll()),
            Arc::clone(&bus),
        )
        .with_backoff(config.backoff())
        .with_drain_timeout(config.drain_timeout());
        let token = shutdown.clone();
        agents.spawn(async move { agent.run(token).await });
    }

    if matches!(cli.command, Commands::Deployment | Commands::All) {
        let agent = BackgroundAgent::new(DeploymentHandler::new(Arc::clone(&invoker)), Arc::clone(&bus))
            .with_backoff(config.backoff())
            .with_drain_timeout(config.drain_timeout());
        let token = shutdown.clone();
        agents.spawn(async move { agent.run(token).await });
    }

    if matches!(cli.command, Commands::Cost | Commands::All) {
        let agent = BackgroundAgent::new(CostHandler::new(Arc::clone(&invoker)), Arc::clone(&bus))
            .with_backoff(config.backoff())
            .with_drain_timeout(config.drain_timeout());
        let token = shutdown.clone();
        agents.spawn(async move { agent.run(token).await });

        let monitor = CostMonitor::new(
            Arc::clone(&invoker),
            Arc::clone(&bus),
            config.cost_monitor_interval(),
            config.cost_customer_id.clone(),
            config.cost_savings_threshold,
        );
        let token = shutdown.clone();
        agents.spawn(async move { monitor.run(token).await });
    }

    shutdown_signal().await;
    shutdown.cancel();

    while let Some(joined) = agents.join_next().await {
        joined.context("agent task panicked")?;
    }

    info!("Fleet agent stopped");
    Ok(())
}
