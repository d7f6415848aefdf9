//! Tool servers and the gateway that dispatches across them.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::client::ToolInvoker;
use crate::error::{GatewayError, InvokeError};
use crate::protocol::split_method;
use crate::tool::{Tool, ToolDescriptor};

/// Server used when a method carries no `<server>.` prefix.
pub const DEFAULT_SERVER: &str = "platform";

/// A named group of tools.
#[derive(Debug, Clone)]
pub struct ToolServer {
    name: String,
    description: String,
    tools: HashMap<String, Tool>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Insert a tool, replacing any previous tool with the same name.
    pub fn insert(&mut self, tool: Tool) -> Option<Tool> {
        self.tools.insert(tool.name().to_string(), tool)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(Tool::descriptor).collect()
    }
}

/// Summary of a registered server.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub description: String,
    pub tool_count: usize,
}

/// Dispatch layer routing execute calls to the right server and tool.
///
/// The lock only guards map lookups; handlers run after it is released.
pub struct Gateway {
    servers: RwLock<HashMap<String, ToolServer>>,
    default_server: String,
}

impl Gateway {
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_server(DEFAULT_SERVER)
    }

    #[must_use]
    pub fn with_default_server(default_server: impl Into<String>) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            default_server: default_server.into(),
        }
    }

    pub fn default_server(&self) -> &str {
        &self.default_server
    }

    /// Register an empty server. An existing server keeps its tools and
    /// takes the new description.
    pub async fn register_server(&self, name: &str, description: &str) {
        let mut servers = self.servers.write().await;
        servers
            .entry(name.to_string())
            .and_modify(|server| server.description = description.to_string())
            .or_insert_with(|| ToolServer::new(name, description));
        info!(server = %name, "Registered tool server");
    }

    /// Register a tool on a server, creating the server if needed.
    ///
    /// The last registration for a given name wins.
    pub async fn register_tool(&self, server: &str, tool: Tool) {
        let tool_name = tool.name().to_string();
        let mut servers = self.servers.write().await;
        let entry = servers
            .entry(server.to_string())
            .or_insert_with(|| ToolServer::new(server, ""));
        if entry.insert(tool).is_some() {
            warn!(server = %server, tool = %tool_name, "Tool re-registered, replacing previous handler");
        } else {
            debug!(server = %server, tool = %tool_name, "Registered tool");
        }
    }

    /// Execute a tool and return exactly what its handler produced.
    #[instrument(skip(self, params), fields(server = %server, tool = %tool))]
    pub async fn execute(
        &self,
        server: &str,
        tool: &str,
        params: Value,
    ) -> Result<Value, GatewayError> {
        let found = {
            let servers = self.servers.read().await;
            let tool_server = servers
                .get(server)
                .ok_or_else(|| GatewayError::ServerNotFound(server.to_string()))?;
            tool_server
                .get(tool)
                .cloned()
                .ok_or_else(|| GatewayError::ToolNotFound(tool.to_string()))?
        };

        debug!("Executing tool");
        found.invoke(params).await
    }

    /// List the tools of one server, in no particular order.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, GatewayError> {
        let servers = self.servers.read().await;
        servers
            .get(server)
            .map(ToolServer::descriptors)
            .ok_or_else(|| GatewayError::ServerNotFound(server.to_string()))
    }

    /// List every tool of every server as `(server, tool)` pairs.
    pub async fn list_all_tools(&self) -> Vec<(String, ToolDescriptor)> {
        let servers = self.servers.read().await;
        servers
            .values()
            .flat_map(|server| {
                server
                    .descriptors()
                    .into_iter()
                    .map(|tool| (server.name().to_string(), tool))
            })
            .collect()
    }

    pub async fn servers(&self) -> Vec<ServerSummary> {
        let servers = self.servers.read().await;
        let mut summaries: Vec<ServerSummary> = servers
            .values()
            .map(|server| ServerSummary {
                name: server.name().to_string(),
                description: server.description().to_string(),
                tool_count: server.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolInvoker for Gateway {
    async fn invoke(&self, method: &str, params: Value) -> Result<Value, InvokeError> {
        let (server, tool) = split_method(method, &self.default_server);
        Ok(self.execute(server, tool, params).await?)
    }
}
