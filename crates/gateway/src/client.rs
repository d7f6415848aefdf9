//! Tool invocation seam and its HTTP implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::InvokeError;
use crate::protocol::{RpcRequest, RpcResponse};

/// Default timeout for gateway calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Anything that can run a tool by method name.
///
/// `method` is `<server>.<tool>` or a bare tool name on the default server.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, InvokeError>;
}

#[async_trait]
impl<T: ToolInvoker + ?Sized> ToolInvoker for Arc<T> {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, InvokeError> {
        (**self).invoke(method, params).await
    }
}

/// JSON-RPC client for a remote tool gateway.
pub struct GatewayClient {
    client: Client,
    execute_url: String,
    next_id: AtomicU64,
}

impl GatewayClient {
    /// Create a client with the default timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, InvokeError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom per-call timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, InvokeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            execute_url: format!("{}/execute", base_url.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn execute_url(&self) -> &str {
        &self.execute_url
    }
}

#[async_trait]
impl ToolInvoker for GatewayClient {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, InvokeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        debug!(url = %self.execute_url, method = %method, id, "Calling gateway");

        let response = self
            .client
            .post(&self.execute_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let envelope: RpcResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(InvokeError::Decode(e.to_string())),
            Err(_) => {
                return Err(InvokeError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        if let Some(error) = envelope.error {
            return Err(InvokeError::Rpc {
                code: error.code,
                message: error.detail(),
            });
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }
}
