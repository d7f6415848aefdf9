//! Request orchestrator for the GPU fleet platform.
//!
//! Free-text requests are classified into an [`Intent`], bound to a
//! [`Workflow`] and executed step by step against the tool gateway. Each
//! step sees the request params and the results of the steps before it.
//!
//! ```text
//! POST /api/v1/requests {"request": "deploy llama", "params": {...}}
//!   -> classify -> deploy_model workflow
//!   -> validate_customer, allocate_gpu, deploy_model, validate_deployment
//! ```
//!
//! Requests live in an [`ExecutionRegistry`] owned by a single task, so
//! concurrent executions never contend on a lock.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod state;
pub mod step;
pub mod workflows;

pub use api::router;
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, StepError};
pub use intent::{classify, Intent};
pub use orchestrator::{Orchestrator, WorkflowExecution};
pub use registry::ExecutionRegistry;
pub use request::{Request, RequestStatus};
pub use state::WorkflowState;
pub use step::{Step, StepContext, WorkflowSettings};
pub use workflows::{Workflow, WorkflowCatalog, WorkflowDefinition};
