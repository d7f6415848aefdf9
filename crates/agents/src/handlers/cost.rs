//! Cost reporting requests and the periodic savings monitor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use gateway::ToolInvoker;
use serde_json::{json, Value};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::AgentHandler;
use crate::bus::MessageBus;
use crate::error::AgentError;
use crate::message::AgentMessage;

pub const COST_CHANNEL: &str = "agent.cost";

/// Where the monitor announces savings opportunities.
pub const COST_NOTIFICATION_CHANNEL: &str = "notifications.cost";

const REPORT_PERIOD_DAYS: i64 = 30;
const MONITOR_PERIOD_DAYS: i64 = 7;
const FORECAST_DAYS: u64 = 30;

/// Answers `get_costs`, `forecast` and `optimize` actions.
pub struct CostHandler {
    invoker: Arc<dyn ToolInvoker>,
}

impl CostHandler {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { invoker }
    }
}

fn period_ending_now(days: i64) -> Value {
    let end = Utc::now();
    json!({
        "start": (end - ChronoDuration::days(days)).to_rfc3339(),
        "end": end.to_rfc3339(),
    })
}

#[async_trait]
impl AgentHandler for CostHandler {
    fn name(&self) -> &'static str {
        "cost"
    }

    fn channel(&self) -> &'static str {
        COST_CHANNEL
    }

    async fn handle(
        &self,
        message: &AgentMessage,
        _cancel: &CancellationToken,
    ) -> Result<Value, AgentError> {
        let customer_id = message.require_str("customer_id")?;
        let action = message.require_str("action")?;

        let (tool, params) = match action {
            "get_costs" => (
                "get_costs",
                json!({ "customer_id": customer_id, "period": period_ending_now(REPORT_PERIOD_DAYS) }),
            ),
            "forecast" => (
                "forecast_costs",
                json!({ "customer_id": customer_id, "forecast_days": FORECAST_DAYS }),
            ),
            "optimize" => (
                "recommend_optimization",
                json!({ "customer_id": customer_id, "optimization_target": "cost" }),
            ),
            other => return Err(AgentError::UnknownAction(other.to_string())),
        };

        debug!(action = %action, tool = %tool, "Handling cost request");
        Ok(self.invoker.invoke(tool, params).await?)
    }
}

/// Periodically checks one customer's spend and publishes a notification
/// when the recommended savings pass a threshold.
pub struct CostMonitor {
    invoker: Arc<dyn ToolInvoker>,
    bus: Arc<dyn MessageBus>,
    interval: Duration,
    customer_id: String,
    savings_threshold: f64,
}

impl CostMonitor {
    pub fn new(
        invoker: Arc<dyn ToolInvoker>,
        bus: Arc<dyn MessageBus>,
        interval: Duration,
        customer_id: impl Into<String>,
        savings_threshold: f64,
    ) -> Self {
        Self {
            invoker,
            bus,
            interval,
            customer_id: customer_id.into(),
            savings_threshold,
        }
    }

    /// Run one check. Returns the published notification, if any.
    pub async fn check_once(&self) -> Result<Option<Value>, AgentError> {
        let costs = self
            .invoker
            .invoke(
                "get_costs",
                json!({ "customer_id": self.customer_id, "period": period_ending_now(MONITOR_PERIOD_DAYS) }),
            )
            .await?;
        debug!(
            customer_id = %self.customer_id,
            total_cost = costs.get("total_cost").and_then(serde_json::Value::as_f64),
            "Current costs retrieved"
        );

        let advice = self
            .invoker
            .invoke(
                "recommend_optimization",
                json!({ "customer_id": self.customer_id, "optimization_target": "cost" }),
            )
            .await?;
        let savings = advice
            .get("total_potential_savings")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                AgentError::UnexpectedResult(format!("no total_potential_savings in {advice}"))
            })?;

        if savings <= self.savings_threshold {
            debug!(customer_id = %self.customer_id, savings, "No significant savings");
            return Ok(None);
        }

        info!(customer_id = %self.customer_id, potential_savings = savings, "Optimization opportunity detected");
        let notification = json!({
            "type": "cost_optimization",
            "customer_id": self.customer_id,
            "potential_savings": savings,
            "recommendations": advice.get("recommendations").cloned().unwrap_or(Value::Null),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let payload = serde_json::to_vec(&notification)
            .map_err(|e| AgentError::UnexpectedResult(e.to_string()))?;
        self.bus.publish(COST_NOTIFICATION_CHANNEL, payload).await?;
        Ok(Some(notification))
    }

    /// Check on every interval tick until `shutdown` fires. The first check
    /// runs one interval after start.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(customer_id = %self.customer_id, interval = ?self.interval, "Starting cost monitor");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let checked = tokio::select! {
                        () = shutdown.cancelled() => break,
                        checked = self.check_once() => checked,
                    };
                    if let Err(e) = checked {
                        warn!(error = %e, "Cost check failed");
                    }
                }
            }
        }
        info!("Cost monitor stopped");
    }
}
