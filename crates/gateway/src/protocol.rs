//! JSON-RPC 2.0 envelope used on the `/execute` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Inbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// The most specific human-readable description available.
    pub fn detail(&self) -> String {
        match &self.data {
            Some(Value::String(data)) => data.clone(),
            Some(data) if !data.is_null() => format!("{}: {data}", self.message),
            _ => self.message.clone(),
        }
    }
}

impl From<&GatewayError> for RpcError {
    fn from(err: &GatewayError) -> Self {
        let (code, message) = match err {
            GatewayError::ServerNotFound(_) | GatewayError::ToolNotFound(_) => {
                (codes::METHOD_NOT_FOUND, "Method not found")
            }
            GatewayError::InvalidParams { .. } => (codes::INVALID_PARAMS, "Invalid params"),
            GatewayError::InvalidSchema { .. } | GatewayError::ToolFailed { .. } => {
                (codes::INTERNAL_ERROR, "Internal error")
            }
        };
        Self::new(code, message, Some(Value::String(err.to_string())))
    }
}

/// Outbound response envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Split `<server>.<tool>` into its parts; a bare tool name resolves to
/// `default_server`.
pub fn split_method<'a>(method: &'a str, default_server: &'a str) -> (&'a str, &'a str) {
    match method.split_once('.') {
        Some((server, tool)) if !server.is_empty() && !tool.is_empty() => (server, tool),
        _ => (default_server, method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_method() {
        assert_eq!(split_method("deploy_model", "platform"), ("platform", "deploy_model"));
        assert_eq!(split_method("vllm.load_lora", "platform"), ("vllm", "load_lora"));
        assert_eq!(split_method(".oops", "platform"), ("platform", ".oops"));
    }

    #[test]
    fn test_not_found_maps_to_method_not_found() {
        let err = GatewayError::ToolNotFound("nonexistent_tool".to_string());
        let rpc = RpcError::from(&err);
        assert_eq!(rpc.code, codes::METHOD_NOT_FOUND);
        assert_eq!(rpc.detail(), "tool not found: nonexistent_tool");
    }

    #[test]
    fn test_failure_envelope_omits_result() {
        let response = RpcResponse::failure(
            json!(7),
            RpcError::new(codes::INTERNAL_ERROR, "Internal error", None),
        );
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["id"], 7);
        assert!(encoded.get("result").is_none());
        assert_eq!(encoded["error"]["code"], -32603);
    }
}
