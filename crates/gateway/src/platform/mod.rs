//! Simulated platform toolset.
//!
//! Two servers are registered:
//!
//! - `platform`: GPU allocation, model deployment, LoRA training, cost
//!   analysis and routing updates.
//! - `vllm`: direct control of the inference engine and its adapters.
//!
//! Nothing here talks to a cluster. State lives in a [`PlatformBackend`]
//! so that multi-call flows (start a training job, poll it, deploy the
//! adapter) behave consistently within one gateway process.

mod costs;
mod deploy;
mod training;
mod vllm;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{GatewayError, ToolError};
use crate::registry::Gateway;
use crate::tool::{handler_fn, Tool};

/// Name of the server holding the platform tools.
pub const PLATFORM_SERVER: &str = "platform";

/// Name of the server holding the inference engine tools.
pub const VLLM_SERVER: &str = "vllm";

/// Hourly price of one vGPU in USD.
pub const VGPU_HOURLY_COST: f64 = 2.40;

/// Default simulated training run length.
pub const DEFAULT_TRAINING_DURATION_SECS: u64 = 10;

/// Default bound on each kind of record the backend keeps.
pub const DEFAULT_MAX_RECORDS: usize = 1024;

/// Tunables for the simulated backend.
#[derive(Debug, Clone, Copy)]
pub struct PlatformSettings {
    /// How long a simulated training job stays `running`.
    pub training_duration: Duration,
    /// Upper bound on training jobs, deployments, routes and adapters each.
    /// The oldest training job is forgotten first; the other kinds refuse
    /// new entries once full.
    pub max_records: usize,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            training_duration: Duration::from_secs(DEFAULT_TRAINING_DURATION_SECS),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

#[derive(Debug, Clone)]
struct TrainingJob {
    started_at: Instant,
    base_model: String,
    dataset_path: String,
}

#[derive(Debug, Clone)]
struct Deployment {
    namespace: String,
    endpoint_url: String,
    vgpu: f64,
    replicas: u64,
}

#[derive(Debug, Default)]
struct PlatformState {
    jobs: HashMap<String, TrainingJob>,
    deployments: BTreeMap<String, Deployment>,
    routes: HashMap<String, Value>,
    adapters: BTreeMap<String, String>,
}

/// In-memory state shared by all simulated tools.
#[derive(Debug, Default)]
pub struct PlatformBackend {
    settings: PlatformSettings,
    state: Mutex<PlatformState>,
}

impl PlatformState {
    /// Record a job, forgetting the oldest ones past `max`.
    fn insert_job(&mut self, id: String, job: TrainingJob, max: usize) {
        while self.jobs.len() >= max.max(1) {
            let Some(oldest) = self
                .jobs
                .iter()
                .min_by_key(|(_, job)| job.started_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.jobs.remove(&oldest);
            debug!(job_id = %oldest, "Forgot oldest training job");
        }
        self.jobs.insert(id, job);
    }
}

/// Refuse a new entry once a map holds `max` of them.
fn ensure_room(len: usize, exists: bool, max: usize, what: &str) -> Result<(), ToolError> {
    if exists || len < max {
        Ok(())
    } else {
        Err(ToolError::Failed(format!("{what} limit of {max} reached")))
    }
}

impl PlatformBackend {
    #[must_use]
    pub fn new(settings: PlatformSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(PlatformState::default()),
        }
    }

    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }
}

/// Register the `platform` and `vllm` servers with their tools.
///
/// # Errors
/// Fails if a tool's input schema does not compile.
pub async fn register_platform_tools(
    gateway: &Gateway,
    backend: Arc<PlatformBackend>,
) -> Result<(), GatewayError> {
    gateway
        .register_server(PLATFORM_SERVER, "GPU fleet platform operations")
        .await;
    gateway
        .register_server(VLLM_SERVER, "vLLM inference engine tools")
        .await;

    let platform_tools = [
        deploy::allocate_gpu(&backend)?,
        deploy::deploy_model(&backend)?,
        deploy::update_routing(&backend)?,
        training::start_training(&backend)?,
        training::get_training_status(&backend)?,
        costs::query_usage()?,
        costs::recommend_optimization()?,
        costs::get_costs(&backend)?,
        costs::forecast_costs()?,
    ];
    for tool in platform_tools {
        gateway.register_tool(PLATFORM_SERVER, tool).await;
    }

    let vllm_tools = [
        vllm::deploy_model()?,
        vllm::load_lora(&backend)?,
        vllm::unload_lora(&backend)?,
        vllm::list_adapters(&backend)?,
    ];
    for tool in vllm_tools {
        gateway.register_tool(VLLM_SERVER, tool).await;
    }

    info!("Registered simulated platform toolset");
    Ok(())
}

/// Build a tool whose handler receives the shared backend.
fn backend_tool<F, Fut>(
    backend: &Arc<PlatformBackend>,
    name: &str,
    description: &str,
    schema: Value,
    f: F,
) -> Result<Tool, GatewayError>
where
    F: Fn(Arc<PlatformBackend>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    let backend = Arc::clone(backend);
    Tool::new(
        name,
        description,
        schema,
        handler_fn(move |params: Value| f(Arc::clone(&backend), params)),
    )
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Lowercase a model id into a DNS-label friendly fragment.
fn dns_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ToolInvoker;
    use serde_json::json;

    async fn gateway() -> Gateway {
        bounded_gateway(DEFAULT_MAX_RECORDS).await
    }

    async fn bounded_gateway(max_records: usize) -> Gateway {
        let gateway = Gateway::new();
        let backend = Arc::new(PlatformBackend::new(PlatformSettings {
            training_duration: Duration::from_millis(50),
            max_records,
        }));
        register_platform_tools(&gateway, backend).await.unwrap();
        gateway
    }

    #[test]
    fn test_dns_fragment() {
        assert_eq!(dns_fragment("meta-llama/Llama-3-8b"), "meta-llama-llama-3-8b");
        assert_eq!(dns_fragment("m1"), "m1");
        assert_eq!(dns_fragment("__Weird..Name__"), "weird-name");
    }

    #[tokio::test]
    async fn test_registers_both_servers() {
        let gateway = gateway().await;
        assert_eq!(gateway.list_tools(PLATFORM_SERVER).await.unwrap().len(), 9);
        assert_eq!(gateway.list_tools(VLLM_SERVER).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_deploy_model_endpoint_and_cost() {
        let gateway = gateway().await;
        let result = gateway
            .invoke(
                "deploy_model",
                json!({ "model_id": "m1", "customer_id": "acme", "config": { "vgpu": 0.5 } }),
            )
            .await
            .unwrap();

        assert_eq!(
            result["endpoint_url"],
            "http://vllm-m1.acme.svc.cluster.local:8000"
        );
        assert_eq!(result["deployment"], "vllm-m1");
        assert_eq!(result["estimated_cost"]["hourly"], json!(1.2));
        assert_eq!(result["estimated_cost"]["monthly"], json!(864.0));
    }

    #[tokio::test]
    async fn test_deploy_model_requires_customer() {
        let gateway = gateway().await;
        let err = gateway
            .invoke("deploy_model", json!({ "model_id": "m1" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid params for deploy_model"));
    }

    #[tokio::test]
    async fn test_training_job_lifecycle() {
        let gateway = gateway().await;
        let started = gateway
            .invoke("start_training", json!({ "dataset_path": "s3://data/train.jsonl" }))
            .await
            .unwrap();
        let job_id = started["job_id"].as_str().unwrap().to_string();
        assert_eq!(started["base_model"], "meta-llama/Llama-3-8b");
        assert_eq!(started["lora_config"]["rank"], 32);

        let running = gateway
            .invoke("get_training_status", json!({ "job_id": job_id }))
            .await
            .unwrap();
        assert_eq!(running["status"], "running");

        tokio::time::sleep(Duration::from_millis(80)).await;
        let done = gateway
            .invoke("get_training_status", json!({ "job_id": job_id }))
            .await
            .unwrap();
        assert_eq!(done["status"], "completed");
        assert_eq!(done["adapter_id"], format!("adapter-{job_id}"));
    }

    #[tokio::test]
    async fn test_unknown_training_job_fails() {
        let gateway = gateway().await;
        let err = gateway
            .invoke("get_training_status", json!({ "job_id": "training-missing" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("training job training-missing not found"));
    }

    #[tokio::test]
    async fn test_cost_recommendations_total() {
        let gateway = gateway().await;
        let result = gateway
            .invoke("recommend_optimization", json!({ "customer_id": "acme" }))
            .await
            .unwrap();
        assert_eq!(result["optimization_target"], "cost");
        assert_eq!(result["recommendations"].as_array().unwrap().len(), 3);
        assert_eq!(result["total_potential_savings"], json!(392.0));
    }

    #[tokio::test]
    async fn test_lora_adapter_lifecycle() {
        let gateway = gateway().await;
        gateway
            .invoke(
                "vllm.load_lora",
                json!({ "adapter_name": "support-bot", "adapter_path": "/adapters/support-bot" }),
            )
            .await
            .unwrap();

        let listed = gateway.invoke("vllm.list_adapters", json!({})).await.unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["adapters"][0]["name"], "support-bot");

        gateway
            .invoke("vllm.unload_lora", json!({ "adapter_name": "support-bot" }))
            .await
            .unwrap();
        let err = gateway
            .invoke("vllm.unload_lora", json!({ "adapter_name": "support-bot" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("adapter support-bot not found"));
    }

    #[tokio::test]
    async fn test_oldest_training_job_forgotten_past_limit() {
        let gateway = bounded_gateway(2).await;
        let mut jobs = Vec::new();
        for _ in 0..3 {
            let started = gateway
                .invoke("start_training", json!({ "dataset_path": "s3://data/train.jsonl" }))
                .await
                .unwrap();
            jobs.push(started["job_id"].as_str().unwrap().to_string());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let err = gateway
            .invoke("get_training_status", json!({ "job_id": jobs[0] }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
        for job_id in &jobs[1..] {
            gateway
                .invoke("get_training_status", json!({ "job_id": job_id }))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_backend_refuses_new_deployments_and_adapters() {
        let gateway = bounded_gateway(1).await;
        let deploy = |model: &str| json!({ "model_id": model, "customer_id": "acme" });

        gateway.invoke("deploy_model", deploy("m1")).await.unwrap();
        gateway.invoke("deploy_model", deploy("m1")).await.unwrap();
        let err = gateway.invoke("deploy_model", deploy("m2")).await.unwrap_err();
        assert!(err.to_string().contains("deployment limit of 1 reached"), "{err}");

        let load = |name: &str| json!({ "adapter_name": name, "adapter_path": "/adapters/x" });
        gateway.invoke("vllm.load_lora", load("a")).await.unwrap();
        let err = gateway.invoke("vllm.load_lora", load("b")).await.unwrap_err();
        assert!(err.to_string().contains("adapter limit of 1 reached"), "{err}");

        gateway
            .invoke("vllm.unload_lora", json!({ "adapter_name": "a" }))
            .await
            .unwrap();
        gateway.invoke("vllm.load_lora", load("b")).await.unwrap();
    }
}
