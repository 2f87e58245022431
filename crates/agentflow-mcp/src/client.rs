use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rmcp::model::{CallToolRequestParams, Content, RawContent, Tool as McpTool};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use agentflow_core::config::{McpConfig, McpServerConfig, McpTransport};
use agentflow_core::error::McpError;
use agentflow_core::traits::ToolProviderClient;
use agentflow_core::types::{ToolDefinition, ToolResult};

use crate::handler::{AgentflowClientHandler, ToolRevisions};

type McpConnection = RunningService<RoleClient, AgentflowClientHandler>;

/// Manages connections to the MCP servers named in configuration.
///
/// Providers are addressed by their config key. Connections are opened
/// lazily through [`ToolProviderClient::connect`], so a flow only spawns the
/// servers its ToolProvider nodes reference.
pub struct McpClientManager {
    servers: HashMap<String, McpServerConfig>,
    connections: Mutex<HashMap<String, McpConnection>>,
    /// Env overrides used for the live connection, reapplied on reconnect.
    overrides: Mutex<HashMap<String, HashMap<String, String>>>,
    revisions: Arc<ToolRevisions>,
}

impl McpClientManager {
    pub fn new(config: &McpConfig) -> Self {
        Self {
            servers: config.servers.clone(),
            connections: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
            revisions: Arc::default(),
        }
    }

    /// Number of `tools/list_changed` notifications received from `name`.
    pub fn tools_revision_of(&self, name: &str) -> u64 {
        self.revisions.get(name)
    }

    /// All configured server names, sorted.
    pub fn configured_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Connect to a configured server, merging `env` over its configured
    /// environment. Replaces any existing connection.
    pub async fn connect_server(
        &self,
        name: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), McpError> {
        let config = self
            .servers
            .get(name)
            .ok_or_else(|| McpError::ConnectionFailed {
                provider: name.to_string(),
                message: "no MCP server configured under this name".to_string(),
            })?;

        let handler = AgentflowClientHandler::new(name, self.revisions.clone());

        let client = match &config.transport {
            McpTransport::Stdio {
                command,
                args,
                env: base_env,
            } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in base_env.iter().chain(env.iter()) {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd).map_err(|e| {
                    McpError::ConnectionFailed {
                        provider: name.to_string(),
                        message: format!("failed to spawn {}: {}", command, e),
                    }
                })?;

                handler
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        provider: name.to_string(),
                        message: format!("initialization failed: {}", e),
                    })?
            }
            McpTransport::Http { url } => {
                if !env.is_empty() {
                    debug!(server = %name, "Ignoring env overrides for HTTP transport");
                }
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                <AgentflowClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        provider: name.to_string(),
                        message: format!("initialization failed: {}", e),
                    })?
            }
        };

        info!(server = %name, "MCP server connected");

        if let Some(mut old) = self
            .connections
            .lock()
            .await
            .insert(name.to_string(), client)
        {
            let _ = old.close().await;
        }
        self.overrides
            .lock()
            .await
            .insert(name.to_string(), env.clone());
        Ok(())
    }

    /// Reconnect using the overrides of the previous connection.
    async fn reconnect(&self, name: &str) -> Result<(), McpError> {
        let env = self
            .overrides
            .lock()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default();

        {
            let mut conns = self.connections.lock().await;
            if let Some(mut old) = conns.remove(name) {
                let _ = old.close().await;
            }
        }

        self.connect_server(name, &env).await
    }

    /// Check if a server connection is still alive.
    pub async fn is_server_connected(&self, name: &str) -> bool {
        let conns = self.connections.lock().await;
        conns.get(name).map(|c| !c.is_closed()).unwrap_or(false)
    }

    /// List tools from a connected server.
    pub async fn list_server_tools(&self, name: &str) -> Result<Vec<ToolDefinition>, McpError> {
        let conns = self.connections.lock().await;
        let client = conns.get(name).ok_or_else(|| McpError::ListToolsFailed {
            provider: name.to_string(),
            message: "not connected".to_string(),
        })?;

        let tools = client
            .list_all_tools()
            .await
            .map_err(|e| McpError::ListToolsFailed {
                provider: name.to_string(),
                message: e.to_string(),
            })?;

        debug!(server = %name, count = tools.len(), "Listed MCP tools");
        Ok(tools.iter().map(to_definition).collect())
    }

    /// Call a tool, with one reconnect attempt if the transport has closed.
    pub async fn call_server_tool(
        &self,
        name: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, McpError> {
        let arguments = match arguments {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(McpError::Processing(format!(
                    "arguments for '{}' must be a JSON object, got {}",
                    tool_name, other
                )))
            }
        };

        let result = self.call_tool_inner(name, tool_name, arguments.clone()).await;

        // If transport closed, attempt one reconnect
        if let Err(ref e) = result {
            let err_str = e.to_string();
            if err_str.contains("closed") || err_str.contains("Transport") {
                warn!(server = %name, "MCP transport closed, attempting reconnect");
                if self.reconnect(name).await.is_ok() {
                    return self.call_tool_inner(name, tool_name, arguments).await;
                }
            }
        }

        result
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ToolResult, McpError> {
        let timeout = Duration::from_secs(
            self.servers
                .get(name)
                .map(|c| c.timeout_secs)
                .unwrap_or(120),
        );

        let conns = self.connections.lock().await;
        let client = conns
            .get(name)
            .ok_or_else(|| McpError::Processing(format!("Server '{}' not connected", name)))?;

        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = tokio::time::timeout(timeout, client.call_tool(params))
            .await
            .map_err(|_| {
                McpError::Processing(format!(
                    "Tool call '{}.{}' timed out after {}s",
                    name,
                    tool_name,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                McpError::Processing(format!("Tool call '{}.{}' failed: {}", name, tool_name, e))
            })?;

        let text = content_to_text(&result.content);
        if result.is_error.unwrap_or(false) {
            Ok(ToolResult::error(text))
        } else {
            Ok(ToolResult::success(text))
        }
    }

    /// Disconnect from all servers.
    pub async fn disconnect_all(&self) {
        let mut conns = self.connections.lock().await;
        let names: Vec<String> = conns.keys().cloned().collect();
        for name in names {
            if let Some(mut client) = conns.remove(&name) {
                let _ = client.close().await;
                info!(server = %name, "MCP server disconnected");
            }
        }
    }
}

fn to_definition(tool: &McpTool) -> ToolDefinition {
    let schema = serde_json::to_value(&*tool.input_schema)
        .unwrap_or(serde_json::json!({"type": "object"}));
    ToolDefinition {
        name: tool.name.to_string(),
        description: tool
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        input_schema: schema,
    }
}

fn content_to_text(content: &[Content]) -> String {
    content
        .iter()
        .map(|c| match c.raw {
            RawContent::Text(ref t) => t.text.to_string(),
            _ => format!("{:?}", c.raw),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl ToolProviderClient for McpClientManager {
    fn is_connected(&self, provider: &str) -> BoxFuture<'_, bool> {
        let provider = provider.to_string();
        Box::pin(async move { self.is_server_connected(&provider).await })
    }

    fn connect(
        &self,
        provider: &str,
        env: &HashMap<String, String>,
    ) -> BoxFuture<'_, Result<(), McpError>> {
        let provider = provider.to_string();
        let env = env.clone();
        Box::pin(async move { self.connect_server(&provider, &env).await })
    }

    fn list_tools(&self, provider: &str) -> BoxFuture<'_, Result<Vec<ToolDefinition>, McpError>> {
        let provider = provider.to_string();
        Box::pin(async move { self.list_server_tools(&provider).await })
    }

    fn call_tool(
        &self,
        provider: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> BoxFuture<'_, Result<ToolResult, McpError>> {
        let provider = provider.to_string();
        let tool = tool.to_string();
        Box::pin(async move { self.call_server_tool(&provider, &tool, arguments).await })
    }

    fn tools_revision(&self, provider: &str) -> u64 {
        self.tools_revision_of(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(name: &str, command: &str) -> McpConfig {
        let mut servers = HashMap::new();
        servers.insert(
            name.to_string(),
            McpServerConfig {
                transport: McpTransport::Stdio {
                    command: command.to_string(),
                    args: vec![],
                    env: HashMap::new(),
                },
                timeout_secs: 5,
            },
        );
        McpConfig { servers }
    }

    #[tokio::test]
    async fn unknown_server_fails_to_connect() {
        let manager = McpClientManager::new(&McpConfig::default());
        let err = manager.connect("nope", &HashMap::new()).await.unwrap_err();
        assert_eq!(err.code(), "server_connection_failed");
        assert!(!manager.is_connected("nope").await);
    }

    #[tokio::test]
    async fn missing_binary_fails_to_connect() {
        let manager = McpClientManager::new(&config_with(
            "search",
            "/nonexistent/agentflow-mcp-server-binary",
        ));
        let err = manager.connect("search", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, McpError::ConnectionFailed { .. }));
        assert_eq!(manager.configured_servers(), vec!["search".to_string()]);
        assert_eq!(manager.tools_revision("search"), 0);
    }

    #[tokio::test]
    async fn list_and_call_require_connection() {
        let manager = McpClientManager::new(&config_with("search", "true"));
        let err = manager.list_tools("search").await.unwrap_err();
        assert_eq!(err.code(), "list_tools_failed");

        let err = manager
            .call_tool("search", "lookup", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "mcp_processing_failed");
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let manager = McpClientManager::new(&config_with("search", "true"));
        let err = manager
            .call_tool("search", "lookup", serde_json::json!([1, 2]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn tool_definition_from_mcp_tool() {
        let schema: serde_json::Map<String, serde_json::Value> = serde_json::from_value(
            serde_json::json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        )
        .unwrap();
        let tool = McpTool::new("lookup", "Find things", Arc::new(schema));
        let def = to_definition(&tool);
        assert_eq!(def.name, "lookup");
        assert_eq!(def.description, "Find things");
        assert_eq!(def.input_schema["properties"]["q"]["type"], "string");
    }
}
