//! GPU allocation, model deployment and routing tools.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::{
    backend_tool, dns_fragment, ensure_room, now_rfc3339, short_id, Deployment,
    PlatformBackend, VGPU_HOURLY_COST,
};
use crate::error::{GatewayError, ToolError};
use crate::tool::{f64_param, object_schema, require_str, str_param, u64_param, Tool};

const DEFAULT_POOL: &str = "default-pool";
const DEFAULT_DURATION: &str = "24h";
const DEFAULT_IMAGE: &str = "vllm/vllm-openai:latest";
const HOURS_PER_MONTH: f64 = 720.0;
const VLLM_PORT: u16 = 8000;

pub(super) fn allocate_gpu(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "allocate_gpu",
        "Claim a fractional GPU allocation from a pool",
        object_schema(
            &["vgpu_size"],
            json!({
                "vgpu_size": { "type": "number", "exclusiveMinimum": 0, "description": "vGPU units to claim" },
                "pool_name": { "type": "string" },
                "duration": { "type": "string", "description": "Claim duration, e.g. 24h" }
            }),
        ),
        handle_allocate_gpu,
    )
}

async fn handle_allocate_gpu(
    _backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let vgpu_size = f64_param(&params, "vgpu_size")
        .ok_or_else(|| ToolError::invalid("vgpu_size", "is required"))?;
    let pool_name = str_param(&params, "pool_name").unwrap_or(DEFAULT_POOL);
    let duration = str_param(&params, "duration").unwrap_or(DEFAULT_DURATION);
    let claim_id = format!("claim-{}", short_id());

    info!(claim_id = %claim_id, vgpu_size, pool = %pool_name, "Allocated GPU claim");
    Ok(json!({
        "status": "success",
        "claim_id": claim_id,
        "vgpu_size": vgpu_size,
        "pool_name": pool_name,
        "duration": duration,
        "created_at": now_rfc3339(),
    }))
}

pub(super) fn deploy_model(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "deploy_model",
        "Deploy a model behind a vLLM endpoint in the customer namespace",
        object_schema(
            &["model_id", "customer_id"],
            json!({
                "model_id": { "type": "string", "minLength": 1 },
                "customer_id": { "type": "string", "minLength": 1 },
                "adapter_id": { "type": "string" },
                "config": {
                    "type": "object",
                    "properties": {
                        "vgpu": { "type": "number", "exclusiveMinimum": 0 },
                        "replicas": { "type": "integer", "minimum": 1 },
                        "image": { "type": "string" }
                    }
                }
            }),
        ),
        handle_deploy_model,
    )
}

async fn handle_deploy_model(
    backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let model_id = require_str(&params, "model_id")?;
    let customer_id = require_str(&params, "customer_id")?;
    let config = params.get("config").cloned().unwrap_or_else(|| json!({}));
    let vgpu = f64_param(&config, "vgpu").unwrap_or(1.0);
    let replicas = u64_param(&config, "replicas").unwrap_or(1);
    let image = str_param(&config, "image").unwrap_or(DEFAULT_IMAGE);
    let adapter_id = str_param(&params, "adapter_id");

    let deployment = format!("vllm-{}", dns_fragment(model_id));
    let endpoint_url =
        format!("http://{deployment}.{customer_id}.svc.cluster.local:{VLLM_PORT}");
    // Precision loss is irrelevant at replica counts.
    #[allow(clippy::cast_precision_loss)]
    let hourly = vgpu * VGPU_HOURLY_COST * replicas as f64;

    let key = format!("{customer_id}/{deployment}");
    let mut state = backend.state.lock().await;
    ensure_room(
        state.deployments.len(),
        state.deployments.contains_key(&key),
        backend.settings().max_records,
        "deployment",
    )?;
    state.deployments.insert(
        key,
        Deployment {
            namespace: customer_id.to_string(),
            endpoint_url: endpoint_url.clone(),
            vgpu,
            replicas,
        },
    );
    drop(state);

    info!(
        deployment = %deployment,
        namespace = %customer_id,
        adapter = ?adapter_id,
        "Deployed model"
    );

    Ok(json!({
        "status": "success",
        "deployment": deployment,
        "namespace": customer_id,
        "endpoint_url": endpoint_url,
        "image": image,
        "adapter_id": adapter_id,
        "vgpu_allocated": vgpu,
        "replicas": replicas,
        "estimated_cost": {
            "hourly": hourly,
            "monthly": hourly * HOURS_PER_MONTH,
        },
        "created_at": now_rfc3339(),
    }))
}

pub(super) fn update_routing(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "update_routing",
        "Create or replace an LLM routing policy",
        object_schema(
            &["route_name", "policy"],
            json!({
                "route_name": { "type": "string", "minLength": 1 },
                "policy": {
                    "type": "object",
                    "properties": {
                        "backends": { "type": "array" }
                    }
                }
            }),
        ),
        handle_update_routing,
    )
}

async fn handle_update_routing(
    backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let route_name = require_str(&params, "route_name")?.to_string();
    let policy = params.get("policy").cloned().unwrap_or(Value::Null);

    let mut state = backend.state.lock().await;
    ensure_room(
        state.routes.len(),
        state.routes.contains_key(&route_name),
        backend.settings().max_records,
        "route",
    )?;
    let replaced = state
        .routes
        .insert(route_name.clone(), policy.clone())
        .is_some();
    drop(state);

    info!(route = %route_name, replaced, "Updated routing policy");
    Ok(json!({
        "status": "success",
        "route_name": route_name,
        "policy": policy,
        "replaced": replaced,
        "updated_at": now_rfc3339(),
    }))
}

/// Monthly cost of one deployment.
pub(super) fn monthly_cost(deployment: &Deployment) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let replicas = deployment.replicas as f64;
    deployment.vgpu * VGPU_HOURLY_COST * replicas * HOURS_PER_MONTH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformSettings;

    #[tokio::test]
    async fn test_allocate_gpu_defaults() {
        let backend = Arc::new(PlatformBackend::new(PlatformSettings::default()));
        let tool = allocate_gpu(&backend).unwrap();
        let result = tool.invoke(json!({ "vgpu_size": 0.5 })).await.unwrap();

        assert!(result["claim_id"].as_str().unwrap().starts_with("claim-"));
        assert_eq!(result["pool_name"], DEFAULT_POOL);
        assert_eq!(result["duration"], DEFAULT_DURATION);
    }

    #[tokio::test]
    async fn test_allocate_gpu_rejects_zero() {
        let backend = Arc::new(PlatformBackend::new(PlatformSettings::default()));
        let tool = allocate_gpu(&backend).unwrap();
        assert!(tool.invoke(json!({ "vgpu_size": 0 })).await.is_err());
    }

    #[tokio::test]
    async fn test_update_routing_reports_replacement() {
        let backend = Arc::new(PlatformBackend::new(PlatformSettings::default()));
        let tool = update_routing(&backend).unwrap();
        let params = json!({ "route_name": "chat", "policy": { "backends": ["a"] } });

        let first = tool.invoke(params.clone()).await.unwrap();
        let second = tool.invoke(params).await.unwrap();
        assert_eq!(first["replaced"], false);
        assert_eq!(second["replaced"], true);
    }
}
