//! `train_and_deploy`: train a LoRA adapter, then serve it.

use std::sync::Arc;

use async_trait::async_trait;
use gateway::wait_for_training;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Workflow;
use crate::error::{OrchestratorError, StepError};
use crate::step::{Step, StepContext};

pub fn train_and_deploy() -> Result<Workflow, OrchestratorError> {
    Workflow::new(
        "train_and_deploy",
        vec![
            Arc::new(ValidateDataset),
            Arc::new(StartTraining),
            Arc::new(MonitorTraining),
            Arc::new(ValidateAdapter),
            Arc::new(DeployAdapter),
        ],
    )
}

struct ValidateDataset;

#[async_trait]
impl Step for ValidateDataset {
    fn name(&self) -> &'static str {
        "validate_dataset"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let dataset_path = ctx.require_str("dataset_path")?;
        Ok(json!({ "valid": true, "dataset_path": dataset_path }))
    }
}

struct StartTraining;

#[async_trait]
impl Step for StartTraining {
    fn name(&self) -> &'static str {
        "start_training"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        Ok(ctx
            .invoker
            .invoke("start_training", ctx.params.clone())
            .await?)
    }
}

struct MonitorTraining;

#[async_trait]
impl Step for MonitorTraining {
    fn name(&self) -> &'static str {
        "monitor_training"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let job_id = ctx.prior_str("start_training", "job_id")?;
        // Steps run to completion; the poll timeout bounds this one.
        let status = wait_for_training(
            ctx.invoker,
            job_id,
            &ctx.settings.training_poll,
            &CancellationToken::new(),
        )
        .await?;
        info!(request_id = %ctx.request_id, job_id = %job_id, "Training finished");
        Ok(status)
    }
}

struct ValidateAdapter;

#[async_trait]
impl Step for ValidateAdapter {
    fn name(&self) -> &'static str {
        "validate_adapter"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let adapter_id = ctx.prior_str("monitor_training", "adapter_id")?;
        Ok(json!({ "valid": true, "adapter_id": adapter_id, "quality": "good" }))
    }
}

/// Deploys the trained adapter. Falls back to the training base model
/// when the request names no `model_id`.
struct DeployAdapter;

#[async_trait]
impl Step for DeployAdapter {
    fn name(&self) -> &'static str {
        "deploy_model"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let adapter_id = ctx.prior_str("monitor_training", "adapter_id")?;

        let mut params = ctx.params_object();
        params.insert("adapter_id".to_string(), json!(adapter_id));
        if !params.contains_key("model_id") {
            let base_model = ctx.prior_str("start_training", "base_model")?;
            params.insert("model_id".to_string(), json!(base_model));
        }

        Ok(ctx
            .invoker
            .invoke("deploy_model", Value::Object(params))
            .await?)
    }
}
