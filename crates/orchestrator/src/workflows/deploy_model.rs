//! `deploy_model`: validate the customer, claim a GPU, deploy, verify.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::Workflow;
use crate::error::{OrchestratorError, StepError};
use crate::step::{Step, StepContext};

pub fn deploy_model() -> Result<Workflow, OrchestratorError> {
    Workflow::new(
        "deploy_model",
        vec![
            Arc::new(ValidateCustomer),
            Arc::new(AllocateGpu),
            Arc::new(DeployModel),
            Arc::new(ValidateDeployment),
        ],
    )
}

pub(crate) struct ValidateCustomer;

#[async_trait]
impl Step for ValidateCustomer {
    fn name(&self) -> &'static str {
        "validate_customer"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let customer_id = ctx.require_str("customer_id")?;
        Ok(json!({ "valid": true, "customer_id": customer_id }))
    }
}

pub(crate) struct AllocateGpu;

#[async_trait]
impl Step for AllocateGpu {
    fn name(&self) -> &'static str {
        "allocate_gpu"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let vgpu = ctx
            .param("vgpu")
            .and_then(Value::as_f64)
            .unwrap_or(ctx.settings.default_vgpu);

        Ok(ctx
            .invoker
            .invoke(
                "allocate_gpu",
                json!({
                    "vgpu_size": vgpu,
                    "duration": ctx.settings.allocation_duration,
                    "pool_name": ctx.settings.default_pool,
                }),
            )
            .await?)
    }
}

/// Deploys with the request params. A top-level `vgpu` is folded into
/// `config` when the caller did not supply one.
pub(crate) struct DeployModel;

#[async_trait]
impl Step for DeployModel {
    fn name(&self) -> &'static str {
        "deploy_model"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let mut params = ctx.params_object();
        if !params.contains_key("config") {
            if let Some(vgpu) = params.get("vgpu").cloned() {
                params.insert("config".to_string(), json!({ "vgpu": vgpu }));
            }
        }

        Ok(ctx
            .invoker
            .invoke("deploy_model", Value::Object(params))
            .await?)
    }
}

pub(crate) struct ValidateDeployment;

#[async_trait]
impl Step for ValidateDeployment {
    fn name(&self) -> &'static str {
        "validate_deployment"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let delay = ctx.settings.stabilization_delay;
        if !delay.is_zero() {
            debug!(request_id = %ctx.request_id, delay_secs = delay.as_secs(), "Waiting for deployment to stabilize");
            tokio::time::sleep(delay).await;
        }

        let endpoint_url = ctx.prior_str("deploy_model", "endpoint_url")?;
        Ok(json!({ "healthy": true, "endpoint_url": endpoint_url }))
    }
}
