//! Wire shapes of agent requests and replies.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

/// An inbound request. Everything besides `request_id` is handler specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub request_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AgentMessage {
    /// Parse a raw payload, rejecting messages without a usable `request_id`.
    pub fn parse(payload: &[u8]) -> Result<Self, AgentError> {
        let message: Self =
            serde_json::from_slice(payload).map_err(|e| AgentError::Malformed(e.to_string()))?;
        if message.request_id.trim().is_empty() {
            return Err(AgentError::Malformed("request_id is empty".to_string()));
        }
        Ok(message)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A required, non-empty string field.
    pub fn require_str(&self, key: &str) -> Result<&str, AgentError> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AgentError::MissingField(key.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Failed,
}

/// Outcome published on `<channel>.response.<request_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub request_id: String,
    pub status: ReplyStatus,
    pub result: Value,
    pub error: Option<String>,
    pub timestamp: String,
}

impl AgentReply {
    pub fn success(request_id: impl Into<String>, result: Value) -> Self {
        Self {
            request_id: request_id.into(),
            status: ReplyStatus::Success,
            result,
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn failed(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ReplyStatus::Failed,
            result: Value::Null,
            error: Some(error.into()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Channel replies for `request_id` are published on.
pub fn reply_channel(channel: &str, request_id: &str) -> String {
    format!("{channel}.response.{request_id}")
}
