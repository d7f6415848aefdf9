//! Workflow definitions.
//!
//! A workflow is an immutable, ordered list of steps built once at startup.

mod deploy_model;
mod optimize_costs;
mod train_and_deploy;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::OrchestratorError;
use crate::step::Step;

pub use deploy_model::deploy_model;
pub use optimize_costs::optimize_costs;
pub use train_and_deploy::train_and_deploy;

/// A named, ordered sequence of steps.
pub struct Workflow {
    name: String,
    steps: Vec<Arc<dyn Step>>,
}

impl Workflow {
    /// Build a workflow, rejecting duplicate step names.
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Step>>) -> Result<Self, OrchestratorError> {
        let name = name.into();
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name()) {
                return Err(OrchestratorError::DuplicateStep {
                    workflow: name,
                    step: step.name().to_string(),
                });
            }
        }
        Ok(Self { name, steps })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    pub fn definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            name: self.name.clone(),
            steps: self.steps.iter().map(|s| s.name().to_string()).collect(),
        }
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.definition().steps)
            .finish()
    }
}

/// Serializable outline of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<String>,
}

/// The set of workflows the orchestrator can run.
#[derive(Debug, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, Arc<Workflow>>,
}

impl WorkflowCatalog {
    /// Catalog with the built-in workflows.
    pub fn standard() -> Result<Self, OrchestratorError> {
        let mut catalog = Self::default();
        catalog.register(deploy_model()?);
        catalog.register(train_and_deploy()?);
        catalog.register(optimize_costs()?);
        Ok(catalog)
    }

    /// Add a workflow, replacing one of the same name.
    pub fn register(&mut self, workflow: Workflow) {
        self.workflows
            .insert(workflow.name().to_string(), Arc::new(workflow));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<WorkflowDefinition> {
        self.workflows.values().map(|w| w.definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_step_order() {
        let catalog = WorkflowCatalog::standard().unwrap();
        let defs = catalog.definitions();
        assert_eq!(defs.len(), 3);

        let deploy = catalog.get("deploy_model").unwrap().definition();
        assert_eq!(
            deploy.steps,
            ["validate_customer", "allocate_gpu", "deploy_model", "validate_deployment"]
        );

        let train = catalog.get("train_and_deploy").unwrap().definition();
        assert_eq!(
            train.steps,
            [
                "validate_dataset",
                "start_training",
                "monitor_training",
                "validate_adapter",
                "deploy_model"
            ]
        );

        let optimize = catalog.get("optimize_costs").unwrap().definition();
        assert_eq!(
            optimize.steps,
            [
                "query_usage",
                "recommend_optimization",
                "present_recommendations",
                "apply_optimizations"
            ]
        );
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(deploy_model::ValidateCustomer),
            Arc::new(deploy_model::ValidateCustomer),
        ];
        let err = Workflow::new("broken", steps).unwrap_err();
        assert_eq!(err.to_string(), "workflow broken declares step validate_customer twice");
    }
}
