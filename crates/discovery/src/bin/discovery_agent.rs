//! Discovery agent - projects labelled LLM Services into `LLMEndpoint` resources.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use discovery::{
    run_watch, DiscoveryAgent, DiscoveryConfig, EndpointProber, EndpointStore, HttpProber,
    KubeEndpointStore, LLMEndpoint,
};
use gateway::telemetry::{init_tracing, shutdown_signal};

/// Discovery agent - watches LLM Services and keeps their endpoint records healthy.
#[derive(Parser)]
#[command(name = "discovery-agent")]
#[command(about = "Discover self-hosted LLM endpoints and track their health")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "DISCOVERY_CONFIG_PATH", default_value = "/config/discovery.yaml")]
    config: String,

    /// Override the Service label selector.
    #[arg(long, env = "DISCOVERY_LABEL_SELECTOR")]
    label_selector: Option<String>,

    /// Print the LLMEndpoint CRD as YAML and exit.
    #[arg(long)]
    print_crd: bool,

    /// Emit logs as JSON.
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_crd {
        let crd = serde_yaml::to_string(&LLMEndpoint::crd()).context("failed to render CRD")?;
        print!("{crd}");
        return Ok(());
    }

    init_tracing(cli.log_json);
    info!("Starting discovery agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DiscoveryConfig::load(Some(&cli.config));
    if let Some(selector) = cli.label_selector {
        config.label_selector = selector;
    }
    config.validate().context("invalid discovery configuration")?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let store: Arc<dyn EndpointStore> =
        Arc::new(KubeEndpointStore::new(client.clone(), config.max_status_retries));
    let prober: Arc<dyn EndpointProber> = Arc::new(
        HttpProber::new(config.probe_timeout()).context("failed to build probe client")?,
    );
    let agent = DiscoveryAgent::new(store, prober, config.settings());

    let shutdown = CancellationToken::new();
    let watch = tokio::spawn(run_watch(
        Api::<Service>::all(client),
        config.label_selector.clone(),
        agent.clone(),
        config.watch_backoff(),
        shutdown.clone(),
    ));
    let sweeps = {
        let agent = agent.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { agent.run_sweeps(token).await })
    };

    shutdown_signal().await;
    shutdown.cancel();

    watch.await.context("watch task panicked")?;
    sweeps.await.context("sweep task panicked")?;
    agent.shutdown().await;

    info!("Discovery agent stopped");
    Ok(())
}
