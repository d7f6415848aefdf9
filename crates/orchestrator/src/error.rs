//! Error types for the orchestrator.

use gateway::{InvokeError, TrainingWaitError};
use thiserror::Error;

/// Errors raised by a single workflow step.
#[derive(Debug, Error)]
pub enum StepError {
    /// A required request parameter was absent or empty.
    #[error("{0} is required")]
    MissingParam(String),

    /// An earlier step's result was missing or had the wrong shape.
    #[error("invalid {step} result: {reason}")]
    InvalidResult { step: String, reason: String },

    /// The tool call failed.
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Waiting on a training job failed.
    #[error(transparent)]
    Training(#[from] TrainingWaitError),
}

impl StepError {
    pub fn missing(param: &str) -> Self {
        Self::MissingParam(param.to_string())
    }

    pub fn invalid_result(step: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResult {
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the orchestrator and its registry.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No request with this id.
    #[error("request not found: {0}")]
    NotFound(String),

    /// The request text matched no known intent.
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    /// A step failed; the workflow was aborted.
    #[error("Step {index} ({name}) failed: {source}")]
    Step {
        index: usize,
        name: String,
        #[source]
        source: StepError,
    },

    /// A step tried to record a result under a name already in the state.
    #[error("duplicate result for step {0}")]
    DuplicateResult(String),

    /// A workflow definition declared two steps with the same name.
    #[error("workflow {workflow} declares step {step} twice")]
    DuplicateStep { workflow: String, step: String },

    /// No workflow is registered for this name.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The request already reached a terminal state.
    #[error("request {0} is already terminal")]
    AlreadyTerminal(String),

    /// The request id is already registered.
    #[error("request {0} already exists")]
    AlreadyExists(String),

    /// The registry owner task is gone.
    #[error("execution registry is closed")]
    RegistryClosed,
}
