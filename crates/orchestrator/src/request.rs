//! Submitted requests and their lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::intent::Intent;

/// Request lifecycle status.
///
/// Moves `pending -> running -> completed | failed`, or straight from
/// `pending` to `failed` when classification fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A user request and everything known about its execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub intent: Intent,
    pub raw_request: String,
    pub parameters: Value,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Request {
    /// Create a pending request. Non-object params are replaced by `{}`.
    pub fn new(raw_request: impl Into<String>, parameters: Value, intent: Intent) -> Self {
        let parameters = match parameters {
            Value::Object(_) => parameters,
            _ => Value::Object(Map::new()),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            intent,
            raw_request: raw_request.into(),
            parameters,
            status: RequestStatus::Pending,
            workflow: None,
            current_step: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A state change applied to a registered request.
#[derive(Debug, Clone)]
pub enum RequestUpdate {
    /// The workflow began running.
    Started { workflow: String },
    /// A step is about to execute.
    StepStarted { name: String },
    /// All steps succeeded.
    Completed { result: Value },
    /// Classification or a step failed.
    Failed { error: String },
}

impl Request {
    /// Apply an update in place. Callers must check terminality first.
    pub(crate) fn apply(&mut self, update: RequestUpdate) {
        let now = Utc::now();
        match update {
            RequestUpdate::Started { workflow } => {
                self.status = RequestStatus::Running;
                self.workflow = Some(workflow);
                self.started_at = Some(now);
            }
            RequestUpdate::StepStarted { name } => {
                self.current_step = Some(name);
            }
            RequestUpdate::Completed { result } => {
                self.status = RequestStatus::Completed;
                self.result = Some(result);
                self.completed_at = Some(now);
            }
            RequestUpdate::Failed { error } => {
                self.status = RequestStatus::Failed;
                self.error = Some(error);
                self.completed_at = Some(now);
            }
        }
    }
}
