//! Model deployment requests.

use std::sync::Arc;

use async_trait::async_trait;
use gateway::ToolInvoker;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::agent::AgentHandler;
use crate::error::AgentError;
use crate::message::AgentMessage;

pub const DEPLOYMENT_CHANNEL: &str = "agent.deployment";

pub struct DeploymentHandler {
    invoker: Arc<dyn ToolInvoker>,
}

impl DeploymentHandler {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl AgentHandler for DeploymentHandler {
    fn name(&self) -> &'static str {
        "deployment"
    }

    fn channel(&self) -> &'static str {
        DEPLOYMENT_CHANNEL
    }

    async fn handle(
        &self,
        message: &AgentMessage,
        _cancel: &CancellationToken,
    ) -> Result<Value, AgentError> {
        let model_id = message.require_str("model_id")?;
        let customer_id = message.require_str("customer_id")?;

        let mut params = json!({ "model_id": model_id, "customer_id": customer_id });
        if let Some(config) = message.get("config").filter(|v| !v.is_null()) {
            params["config"] = config.clone();
        }
        if let Some(adapter_id) = message.get("adapter_id").filter(|v| !v.is_null()) {
            params["adapter_id"] = adapter_id.clone();
        }

        Ok(self.invoker.invoke("deploy_model", params).await?)
    }
}
