//! Error types for the tool gateway.

use thiserror::Error;

/// Errors returned by a tool handler.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A parameter passed schema validation but cannot be used.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    /// The handler referenced something that does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation itself failed.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Shorthand for [`ToolError::InvalidParam`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced by the gateway while registering or dispatching tools.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No server registered under this name.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// The server exists but has no tool with this name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Params were rejected by the tool's input schema.
    #[error("invalid params for {tool}: {reason}")]
    InvalidParams { tool: String, reason: String },

    /// The declared input schema could not be compiled.
    #[error("invalid input schema for {tool}: {reason}")]
    InvalidSchema { tool: String, reason: String },

    /// The handler ran and returned an error.
    #[error("tool {tool} failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: ToolError,
    },
}

/// Errors returned when invoking a tool through a [`crate::ToolInvoker`].
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Network or HTTP client failure talking to the gateway.
    #[error("failed to call gateway: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a JSON-RPC error envelope.
    #[error("gateway error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The gateway answered with a non-success status and no envelope.
    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not a JSON-RPC envelope.
    #[error("failed to decode gateway response: {0}")]
    Decode(String),

    /// In-process dispatch failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
