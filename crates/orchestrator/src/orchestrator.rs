//! Request intake and workflow execution.

use std::sync::Arc;

use gateway::ToolInvoker;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::error::OrchestratorError;
use crate::intent::{classify, Intent};
use crate::registry::ExecutionRegistry;
use crate::request::{Request, RequestUpdate};
use crate::state::WorkflowState;
use crate::step::{StepContext, WorkflowSettings};
use crate::workflows::{Workflow, WorkflowCatalog, WorkflowDefinition};

/// A workflow bound to one request, advanced step by step by its own task.
pub struct WorkflowExecution {
    request_id: String,
    workflow: Arc<Workflow>,
    params: Value,
    current_step: usize,
    state: WorkflowState,
}

impl WorkflowExecution {
    pub fn new(request_id: impl Into<String>, workflow: Arc<Workflow>, params: Value) -> Self {
        Self {
            request_id: request_id.into(),
            workflow,
            params,
            current_step: 0,
            state: WorkflowState::new(),
        }
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// `on_step` is told about each step before it runs.
    pub async fn run<F, Fut>(
        &mut self,
        invoker: &dyn ToolInvoker,
        settings: &WorkflowSettings,
        mut on_step: F,
    ) -> Result<(), OrchestratorError>
    where
        F: FnMut(usize, &'static str) -> Fut + Send,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let workflow = Arc::clone(&self.workflow);
        for (index, step) in workflow.steps().iter().enumerate() {
            self.current_step = index;
            let name = step.name();
            on_step(index, name).await;
            info!(request_id = %self.request_id, step = %name, index, "Executing step");

            let ctx = StepContext {
                request_id: &self.request_id,
                invoker,
                params: &self.params,
                state: &self.state,
                settings,
            };
            let result = step
                .execute(&ctx)
                .await
                .map_err(|source| OrchestratorError::Step {
                    index,
                    name: name.to_string(),
                    source,
                })?;

            if !self.state.insert(name, result) {
                return Err(OrchestratorError::DuplicateResult(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }
}

/// Accepts requests, classifies them and drives their workflows.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: WorkflowCatalog,
    invoker: Arc<dyn ToolInvoker>,
    registry: ExecutionRegistry,
    settings: WorkflowSettings,
}

impl Orchestrator {
    /// Create an orchestrator with the standard workflows.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        invoker: Arc<dyn ToolInvoker>,
        settings: WorkflowSettings,
    ) -> Result<Self, OrchestratorError> {
        Ok(Self::with_catalog(WorkflowCatalog::standard()?, invoker, settings))
    }

    pub fn with_catalog(
        catalog: WorkflowCatalog,
        invoker: Arc<dyn ToolInvoker>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                invoker,
                registry: ExecutionRegistry::spawn_with_limit(settings.max_finished_requests),
                settings,
            }),
        }
    }

    /// Register a request and start working on it in the background.
    ///
    /// Returns the request as registered, still `pending`.
    #[instrument(skip(self, params))]
    pub async fn submit(&self, text: &str, params: Value) -> Result<Request, OrchestratorError> {
        let intent = classify(text);
        let request = Request::new(text, params, intent);
        self.inner.registry.insert(request.clone()).await?;
        info!(request_id = %request.id, intent = %intent, "Accepted request");

        let this = self.clone();
        let id = request.id.clone();
        tokio::spawn(async move {
            this.execute(&id, intent).await;
        });

        Ok(request)
    }

    pub fn get(&self, id: &str) -> Result<Request, OrchestratorError> {
        self.inner
            .registry
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<Request> {
        self.inner.registry.list()
    }

    pub fn workflows(&self) -> Vec<WorkflowDefinition> {
        self.inner.catalog.definitions()
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.inner.registry
    }

    #[instrument(skip(self, id), fields(request_id = %id))]
    async fn execute(&self, id: &str, intent: Intent) {
        let registry = &self.inner.registry;

        let lookup = match intent.workflow_name() {
            None => Err(OrchestratorError::UnknownIntent(intent.to_string())),
            Some(name) => self
                .inner
                .catalog
                .get(name)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(name.to_string())),
        };
        let workflow = match lookup {
            Ok(workflow) => workflow,
            Err(e) => {
                warn!(intent = %intent, error = %e, "No workflow for request");
                self.record(id, RequestUpdate::Failed { error: e.to_string() })
                    .await;
                return;
            }
        };

        let params = match registry.get(id) {
            Some(request) => request.parameters,
            None => {
                error!("Request vanished from registry before execution");
                return;
            }
        };

        self.record(
            id,
            RequestUpdate::Started {
                workflow: workflow.name().to_string(),
            },
        )
        .await;

        let started = Instant::now();
        let mut execution = WorkflowExecution::new(id, workflow, params);
        let outcome = execution
            .run(self.inner.invoker.as_ref(), &self.inner.settings, |_, name| {
                self.record(id, RequestUpdate::StepStarted { name: name.to_string() })
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(elapsed_ms = started.elapsed().as_millis(), "Workflow completed");
                let result = execution.into_state().into_value();
                self.record(id, RequestUpdate::Completed { result }).await;
            }
            Err(e) => {
                error!(error = %e, "Workflow failed");
                self.record(id, RequestUpdate::Failed { error: e.to_string() })
                    .await;
            }
        }
    }

    async fn record(&self, id: &str, update: RequestUpdate) {
        if let Err(e) = self.inner.registry.update(id, update).await {
            warn!(request_id = %id, error = %e, "Failed to record request update");
        }
    }
}
