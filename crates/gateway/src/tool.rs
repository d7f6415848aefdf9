//! Tool definitions and handler plumbing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{GatewayError, ToolError};

/// Executes a single tool call.
///
/// Handlers receive params that already passed the tool's input schema.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, params: Value) -> Result<Value, ToolError> {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a tool handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    FnHandler(f)
}

/// A named, schema-described operation.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    validator: Arc<jsonschema::Validator>,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Build a tool, compiling its input schema up front.
    ///
    /// # Errors
    /// Returns [`GatewayError::InvalidSchema`] if the schema does not compile.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl ToolHandler + 'static,
    ) -> Result<Self, GatewayError> {
        let name = name.into();
        let validator =
            jsonschema::validator_for(&input_schema).map_err(|e| GatewayError::InvalidSchema {
                tool: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            description: description.into(),
            input_schema,
            validator: Arc::new(validator),
            handler: Arc::new(handler),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Check params against the input schema, collecting every violation.
    pub fn validate(&self, params: &Value) -> Result<(), GatewayError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(params)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::InvalidParams {
                tool: self.name.clone(),
                reason: violations.join("; "),
            })
        }
    }

    /// Validate and run the handler.
    pub async fn invoke(&self, params: Value) -> Result<Value, GatewayError> {
        let params = if params.is_null() {
            Value::Object(Map::new())
        } else {
            params
        };
        self.validate(&params)?;

        self.handler
            .call(params)
            .await
            .map_err(|source| GatewayError::ToolFailed {
                tool: self.name.clone(),
                source,
            })
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a tool for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Build an object schema from required keys and a property map.
pub fn object_schema(required: &[&str], properties: Value) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

/// Read a string param.
pub fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Read a required string param.
pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    str_param(params, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::invalid(key, "is required"))
}

/// Read a numeric param.
pub fn f64_param(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

/// Read an integer param.
pub fn u64_param(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> Tool {
        Tool::new(
            "echo",
            "Echo params back",
            object_schema(
                &["message"],
                json!({ "message": { "type": "string" } }),
            ),
            handler_fn(|params: Value| async move { Ok(params) }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_returns_handler_value() {
        let tool = echo_tool();
        let result = tool.invoke(json!({ "message": "hi" })).await.unwrap();
        assert_eq!(result, json!({ "message": "hi" }));
    }

    #[tokio::test]
    async fn test_invoke_rejects_params_violating_schema() {
        let tool = echo_tool();
        let err = tool.invoke(json!({ "message": 42 })).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParams { .. }));
        assert!(err.to_string().starts_with("invalid params for echo"));
    }

    #[tokio::test]
    async fn test_null_params_treated_as_empty_object() {
        let tool = Tool::new(
            "noop",
            "No params",
            object_schema(&[], json!({})),
            handler_fn(|params: Value| async move { Ok(params) }),
        )
        .unwrap();
        assert_eq!(tool.invoke(Value::Null).await.unwrap(), json!({}));
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let result = Tool::new(
            "broken",
            "Bad schema",
            json!({ "type": 12 }),
            handler_fn(|params: Value| async move { Ok(params) }),
        );
        assert!(matches!(result, Err(GatewayError::InvalidSchema { .. })));
    }

    #[test]
    fn test_require_str_rejects_empty() {
        let params = json!({ "a": "", "b": "x" });
        assert!(require_str(&params, "a").is_err());
        assert_eq!(require_str(&params, "b").unwrap(), "x");
    }
}
