//! LoRA training requests.

use std::sync::Arc;

use async_trait::async_trait;
use gateway::{wait_for_training, ToolInvoker, TrainingPoll};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::AgentHandler;
use crate::error::AgentError;
use crate::message::AgentMessage;

pub const TRAINING_CHANNEL: &str = "agent.training";

/// Starts a training job and replies once it has finished.
pub struct TrainingHandler {
    invoker: Arc<dyn ToolInvoker>,
    poll: TrainingPoll,
}

impl TrainingHandler {
    pub fn new(invoker: Arc<dyn ToolInvoker>, poll: TrainingPoll) -> Self {
        Self { invoker, poll }
    }
}

#[async_trait]
impl AgentHandler for TrainingHandler {
    fn name(&self) -> &'static str {
        "training"
    }

    fn channel(&self) -> &'static str {
        TRAINING_CHANNEL
    }

    async fn handle(
        &self,
        message: &AgentMessage,
        cancel: &CancellationToken,
    ) -> Result<Value, AgentError> {
        let dataset_path = message.require_str("dataset_path")?;

        let mut params = Map::new();
        params.insert("dataset_path".to_string(), json!(dataset_path));
        for key in ["base_model", "lora_config"] {
            if let Some(value) = message.get(key).filter(|v| !v.is_null()) {
                params.insert(key.to_string(), value.clone());
            }
        }

        let started = self
            .invoker
            .invoke("start_training", Value::Object(params))
            .await?;
        let job_id = started
            .get("job_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::UnexpectedResult(format!("no job_id in {started}")))?
            .to_string();
        info!(job_id = %job_id, "Training job started");

        let finished = wait_for_training(self.invoker.as_ref(), &job_id, &self.poll, cancel).await?;

        Ok(json!({
            "job_id": job_id,
            "adapter_id": finished.get("adapter_id").cloned().unwrap_or(Value::Null),
            "started": started,
            "completed": finished,
        }))
    }
}
