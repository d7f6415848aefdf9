//! `optimize_costs`: analyse usage, recommend, auto-approve, apply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::Workflow;
use crate::error::{OrchestratorError, StepError};
use crate::step::{Step, StepContext};

/// Monthly savings above which recommendations are approved without a human.
pub const AUTO_APPROVE_THRESHOLD: f64 = 100.0;

pub fn optimize_costs() -> Result<Workflow, OrchestratorError> {
    Workflow::new(
        "optimize_costs",
        vec![
            Arc::new(QueryUsage),
            Arc::new(RecommendOptimization),
            Arc::new(PresentRecommendations),
            Arc::new(ApplyOptimizations),
        ],
    )
}

struct QueryUsage;

#[async_trait]
impl Step for QueryUsage {
    fn name(&self) -> &'static str {
        "query_usage"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let customer_id = ctx.require_str("customer_id")?;
        Ok(ctx
            .invoker
            .invoke(
                "query_usage",
                json!({ "filters": { "customer": customer_id, "time_range": "7d" } }),
            )
            .await?)
    }
}

struct RecommendOptimization;

#[async_trait]
impl Step for RecommendOptimization {
    fn name(&self) -> &'static str {
        "recommend_optimization"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let customer_id = ctx.require_str("customer_id")?;
        let usage = ctx.prior("query_usage")?;
        let target = ctx
            .param("optimization_target")
            .and_then(Value::as_str)
            .unwrap_or("cost");

        Ok(ctx
            .invoker
            .invoke(
                "recommend_optimization",
                json!({
                    "customer_id": customer_id,
                    "optimization_target": target,
                    "usage": usage,
                }),
            )
            .await?)
    }
}

struct PresentRecommendations;

#[async_trait]
impl Step for PresentRecommendations {
    fn name(&self) -> &'static str {
        "present_recommendations"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let recommendations = ctx.prior("recommend_optimization")?;
        let total = recommendations
            .get("total_potential_savings")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                StepError::invalid_result("recommend_optimization", "missing total_potential_savings")
            })?;

        if total > AUTO_APPROVE_THRESHOLD {
            info!(request_id = %ctx.request_id, total_savings = total, "Auto-approved recommendations");
            Ok(json!({
                "approved": true,
                "total_savings": total,
                "recommendations": recommendations,
            }))
        } else {
            Ok(json!({
                "approved": false,
                "reason": "Savings too low to auto-approve",
                "total_savings": total,
                "recommendations": recommendations,
            }))
        }
    }
}

struct ApplyOptimizations;

#[async_trait]
impl Step for ApplyOptimizations {
    fn name(&self) -> &'static str {
        "apply_optimizations"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, StepError> {
        let approval = ctx.prior("present_recommendations")?;
        let approved = approval
            .get("approved")
            .and_then(Value::as_bool)
            .ok_or_else(|| StepError::invalid_result("present_recommendations", "missing approved"))?;

        if !approved {
            return Ok(json!({ "applied": false, "reason": "Not approved" }));
        }

        Ok(json!({
            "applied": true,
            "changes_made": ["updated_routing", "scaled_down_off_peak"],
            "expected_savings": approval.get("total_savings").cloned().unwrap_or(Value::Null),
        }))
    }
}
