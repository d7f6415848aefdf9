//! LoRA training job tools.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::info;

use super::{backend_tool, now_rfc3339, short_id, PlatformBackend, TrainingJob};
use crate::error::{GatewayError, ToolError};
use crate::tool::{object_schema, require_str, str_param, u64_param, Tool};

const DEFAULT_BASE_MODEL: &str = "meta-llama/Llama-3-8b";
const DEFAULT_LORA_RANK: u64 = 32;
const DEFAULT_LORA_ALPHA: u64 = 64;
const ESTIMATED_TRAINING_COST: f64 = 100.0;

pub(super) fn start_training(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "start_training",
        "Start a LoRA fine-tuning job on a dataset",
        object_schema(
            &["dataset_path"],
            json!({
                "dataset_path": { "type": "string", "minLength": 1 },
                "base_model": { "type": "string" },
                "lora_config": {
                    "type": "object",
                    "properties": {
                        "rank": { "type": "integer", "minimum": 1 },
                        "alpha": { "type": "integer", "minimum": 1 }
                    }
                }
            }),
        ),
        handle_start_training,
    )
}

async fn handle_start_training(
    backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let dataset_path = require_str(&params, "dataset_path")?.to_string();
    let base_model = str_param(&params, "base_model")
        .unwrap_or(DEFAULT_BASE_MODEL)
        .to_string();
    let lora = params.get("lora_config").cloned().unwrap_or_else(|| json!({}));
    let rank = u64_param(&lora, "rank").unwrap_or(DEFAULT_LORA_RANK);
    let alpha = u64_param(&lora, "alpha").unwrap_or(DEFAULT_LORA_ALPHA);

    let job_id = format!("training-{}", short_id());
    let settings = backend.settings();
    let duration = settings.training_duration;
    backend.state.lock().await.insert_job(
        job_id.clone(),
        TrainingJob {
            started_at: Instant::now(),
            base_model: base_model.clone(),
            dataset_path: dataset_path.clone(),
        },
        settings.max_records,
    );

    info!(job_id = %job_id, base_model = %base_model, rank, alpha, "Started training job");
    Ok(json!({
        "status": "started",
        "job_id": job_id,
        "dataset_path": dataset_path,
        "base_model": base_model,
        "lora_config": { "rank": rank, "alpha": alpha },
        "estimated_duration_secs": duration.as_secs(),
        "estimated_cost": ESTIMATED_TRAINING_COST,
        "created_at": now_rfc3339(),
    }))
}

pub(super) fn get_training_status(backend: &Arc<PlatformBackend>) -> Result<Tool, GatewayError> {
    backend_tool(
        backend,
        "get_training_status",
        "Report the progress of a training job",
        object_schema(&["job_id"], json!({ "job_id": { "type": "string", "minLength": 1 } })),
        handle_get_training_status,
    )
}

async fn handle_get_training_status(
    backend: Arc<PlatformBackend>,
    params: Value,
) -> Result<Value, ToolError> {
    let job_id = require_str(&params, "job_id")?;
    let job = backend
        .state
        .lock()
        .await
        .jobs
        .get(job_id)
        .cloned()
        .ok_or_else(|| ToolError::NotFound(format!("training job {job_id}")))?;

    let total = backend.settings().training_duration;
    let elapsed = job.started_at.elapsed();
    let mut status = json!({
        "job_id": job_id,
        "base_model": job.base_model,
        "dataset_path": job.dataset_path,
        "elapsed_secs": elapsed.as_secs(),
    });

    if elapsed >= total {
        status["status"] = json!("completed");
        status["progress"] = json!(1.0);
        status["adapter_id"] = json!(format!("adapter-{job_id}"));
    } else {
        let progress = elapsed.as_secs_f64() / total.as_secs_f64();
        status["status"] = json!("running");
        status["progress"] = json!((progress * 100.0).round() / 100.0);
    }
    Ok(status)
}
