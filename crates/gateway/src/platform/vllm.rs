//! Inference engine tools served under the `vllm` server.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::{backend_tool, ensure_room, now_rfc3339, PlatformBackend};
use crate::error::{GatewayError, ToolError};
use crate::tool::{handler_fn, object_schema, require_str, str_param, u64_param, Tool};

const INFERENCE_ENDPOINT: &str = "http://vllm-inference-server-service.vllm.svc.cluster.local:8000";
const DEFAULT_GPU_MEMORY: &str = "24Gi";

pub(super) fn deploy_model() -> Result<Tool, GatewayError> {
    Tool::new(
        "deploy_model",
        "Deploy a model onto the shared vLLM inference server",
        object_schema(
            &["model_name", "gpu_count"],
            json!({
                "model_name": { "type": "string", "minLength": 1 },
                "gpu_count": { "type": "integer", "minimum": 1, "description": "Tensor parallel degree" },
                "gpu_memory": { "type": "string" },
                "replicas": { "type": "integer", "minimum": 1 }
            }),
        ),
        handler_fn(handle_deploy_model),
    )
}

async fn handle_deploy_model(params: Value) -> Result<Value, ToolError> {
    let model_name = require_str(&params, "model_name")?;
    let gpu_count = u64_param(&params, "gpu_count")
        .ok_or_else(|| ToolError::invalid("gpu_count", "is required"))?;
    let gpu_memory = str_param(&params, "gpu_memory").unwrap_or(DEFAULT_GPU_MEMORY);
    let replicas = u64_param(&params, "replicas").unwrap_or(1);

    info!(model = %model_name, gpu_count, replicas, "Deployed model to vLLM");
    Ok(json!({
        "model_name": model_name,
        "endpoint": INFERENCE_ENDPOINT,
        "status": "deployed",
        "gpu_count": gpu_count,
        "gpu_memory": gpu_memory,
        "replicas": replicas,
        "deployed_at": now_rfc3339(),
    }))
}

pub(super) fn load_lora(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "load_lora",
        "Load a LoRA adapter into the inference server",
        object_schema(
            &["adapter_name", "adapter_path"],
            json!({
                "adapter_name": { "type": "string", "minLength": 1 },
                "adapter_path": { "type": "string", "minLength": 1 }
            }),
        ),
        handle_load_lora,
    )
}

async fn handle_load_lora(
    backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let name = require_str(&params, "adapter_name")?;
    let path = require_str(&params, "adapter_path")?;

    let mut state = backend.state.lock().await;
    ensure_room(
        state.adapters.len(),
        state.adapters.contains_key(name),
        backend.settings().max_records,
        "adapter",
    )?;
    state.adapters.insert(name.to_string(), path.to_string());
    drop(state);

    info!(adapter = %name, "Loaded LoRA adapter");
    Ok(json!({ "adapter_name": name, "adapter_path": path, "status": "loaded" }))
}

pub(super) fn unload_lora(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "unload_lora",
        "Unload a LoRA adapter from the inference server",
        object_schema(
            &["adapter_name"],
            json!({ "adapter_name": { "type": "string", "minLength": 1 } }),
        ),
        handle_unload_lora,
    )
}

async fn handle_unload_lora(
    backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let name = require_str(&params, "adapter_name")?;
    backend
        .state
        .lock()
        .await
        .adapters
        .remove(name)
        .ok_or_else(|| ToolError::NotFound(format!("adapter {name}")))?;

    info!(adapter = %name, "Unloaded LoRA adapter");
    Ok(json!({ "adapter_name": name, "status": "unloaded" }))
}

pub(super) fn list_adapters(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "list_adapters",
        "List LoRA adapters currently loaded",
        object_schema(&[], json!({})),
        handle_list_adapters,
    )
}

async fn handle_list_adapters(
    backend: Arc<PlatformBackend>,
    _params: Value,
) -> Result<Value, ToolError> {
    let adapters: Vec<Value> = backend
        .state
        .lock()
        .await
        .adapters
        .iter()
        .map(|(name, path)| json!({ "name": name, "path": path }))
        .collect();

    Ok(json!({ "count": adapters.len(), "adapters": adapters }))
}
