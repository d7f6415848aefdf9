//! The step abstraction and the context each step runs with.

use std::time::Duration;

use async_trait::async_trait;
use gateway::{ToolInvoker, TrainingPoll};
use serde_json::{Map, Value};

use crate::error::StepError;
use crate::state::WorkflowState;

/// Knobs shared by all workflow steps.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Pause before checking a fresh deployment.
    pub stabilization_delay: Duration,
    /// Cadence and bound for training job polling.
    pub training_poll: TrainingPoll,
    /// vGPU units allocated when the request does not say.
    pub default_vgpu: f64,
    pub default_pool: String,
    pub allocation_duration: String,
    /// Finished requests kept for status queries.
    pub max_finished_requests: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            stabilization_delay: Duration::from_secs(5),
            training_poll: TrainingPoll::default(),
            default_vgpu: 1.0,
            default_pool: "default-pool".to_string(),
            allocation_duration: "24h".to_string(),
            max_finished_requests: crate::registry::DEFAULT_MAX_FINISHED,
        }
    }
}

/// Everything a step may read.
///
/// A step sees the request params and the results of the steps before it,
/// never anything later.
pub struct StepContext<'a> {
    pub request_id: &'a str,
    pub invoker: &'a dyn ToolInvoker,
    pub params: &'a Value,
    pub state: &'a WorkflowState,
    pub settings: &'a WorkflowSettings,
}

impl StepContext<'_> {
    /// A required, non-empty string param.
    pub fn require_str(&self, key: &str) -> Result<&str, StepError> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StepError::missing(key))
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// A copy of the request params as a JSON object.
    pub fn params_object(&self) -> Map<String, Value> {
        self.params.as_object().cloned().unwrap_or_default()
    }

    /// The result of an earlier step, which must be a JSON object.
    pub fn prior(&self, step: &str) -> Result<&Map<String, Value>, StepError> {
        match self.state.get(step) {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(StepError::invalid_result(
                step,
                format!("expected an object, got {other}"),
            )),
            None => Err(StepError::invalid_result(step, "missing")),
        }
    }

    /// A string field of an earlier step's result.
    pub fn prior_str(&self, step: &str, key: &str) -> Result<&str, StepError> {
        self.prior(step)?
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StepError::invalid_result(step, format!("missing {key}")))
    }
}

/// One unit of work in a workflow.
#[async_trait]
pub trait Step: Send + Sync {
    /// Name under which the result is recorded.
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway::InvokeError;
    use serde_json::json;

    struct NoTools;

    #[async_trait]
    impl ToolInvoker for NoTools {
        async fn invoke(&self, method: &str, _params: Value) -> Result<Value, InvokeError> {
            panic!("unexpected tool call {method}");
        }
    }

    #[test]
    fn test_prior_result_validation() {
        let mut state = WorkflowState::new();
        state.insert("deploy_model", json!({ "endpoint_url": "http://x" }));
        state.insert("weird", json!("not an object"));
        let params = json!({ "customer_id": "" });
        let settings = WorkflowSettings::default();
        let ctx = StepContext {
            request_id: "r1",
            invoker: &NoTools,
            params: &params,
            state: &state,
            settings: &settings,
        };

        assert_eq!(ctx.prior_str("deploy_model", "endpoint_url").unwrap(), "http://x");
        assert_eq!(
            ctx.prior_str("deploy_model", "claim_id").unwrap_err().to_string(),
            "invalid deploy_model result: missing claim_id"
        );
        assert_eq!(
            ctx.prior("monitor_training").unwrap_err().to_string(),
            "invalid monitor_training result: missing"
        );
        assert!(ctx.prior("weird").is_err());
        assert_eq!(
            ctx.require_str("customer_id").unwrap_err().to_string(),
            "customer_id is required"
        );
    }
}
