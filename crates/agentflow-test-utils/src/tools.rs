use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use agentflow_core::error::McpError;
use agentflow_core::traits::ToolProviderClient;
use agentflow_core::types::{ToolDefinition, ToolResult};

/// One tool invocation the stub received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedToolCall {
    pub provider: String,
    pub tool: String,
    pub arguments: serde_json::Value,
}

type CallHook = Arc<dyn Fn(&RecordedToolCall) + Send + Sync>;

/// In-process tool provider client.
///
/// Providers are declared through [`with_tool`](Self::with_tool). Calls
/// answer with the configured response, or `"ok"` when none was set.
#[derive(Default)]
pub struct StubToolClient {
    tools: Mutex<HashMap<String, Vec<ToolDefinition>>>,
    responses: HashMap<(String, String), ToolResult>,
    unreachable: HashSet<String>,
    connected: Mutex<HashSet<String>>,
    envs: Mutex<HashMap<String, HashMap<String, String>>>,
    calls: Mutex<Vec<RecordedToolCall>>,
    listings: Mutex<HashMap<String, usize>>,
    revisions: Mutex<HashMap<String, u64>>,
    on_call: Option<CallHook>,
}

impl fmt::Debug for StubToolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubToolClient")
            .field("tools", &self.tools)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

fn definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": { "q": { "type": "string" } }
        }),
    }
}

impl StubToolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(self, provider: &str, name: &str, description: &str) -> Self {
        self.tools
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default()
            .push(definition(name, description));
        self
    }

    pub fn with_response(mut self, provider: &str, tool: &str, text: &str) -> Self {
        self.responses.insert(
            (provider.to_string(), tool.to_string()),
            ToolResult::success(text),
        );
        self
    }

    /// Make `connect` fail for `provider`.
    pub fn failing_connect(mut self, provider: &str) -> Self {
        self.unreachable.insert(provider.to_string());
        self
    }

    /// Run `hook` as each call is recorded, before the call answers.
    pub fn on_call(mut self, hook: impl Fn(&RecordedToolCall) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Arc::new(hook));
        self
    }

    /// Add a tool to a live provider and bump its tool-list revision, as a
    /// server sending `tools/list_changed` would.
    pub fn change_tools(&self, provider: &str, name: &str) {
        self.tools
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default()
            .push(definition(name, ""));
        *self
            .revisions
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default() += 1;
    }

    /// How many times `provider` was listed.
    pub fn list_count(&self, provider: &str) -> usize {
        self.listings.lock().unwrap().get(provider).copied().unwrap_or(0)
    }

    pub fn connected(&self, provider: &str) -> bool {
        self.connected.lock().unwrap().contains(provider)
    }

    /// Environment passed on the most recent connect to `provider`.
    pub fn env_for(&self, provider: &str) -> Option<HashMap<String, String>> {
        self.envs.lock().unwrap().get(provider).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ToolProviderClient for StubToolClient {
    fn is_connected(&self, provider: &str) -> BoxFuture<'_, bool> {
        let connected = self.connected(provider);
        Box::pin(async move { connected })
    }

    fn connect(
        &self,
        provider: &str,
        env: &HashMap<String, String>,
    ) -> BoxFuture<'_, Result<(), McpError>> {
        let known = self.tools.lock().unwrap().contains_key(provider);
        let result = if self.unreachable.contains(provider) || !known {
            Err(McpError::ConnectionFailed {
                provider: provider.to_string(),
                message: "unreachable".into(),
            })
        } else {
            self.connected.lock().unwrap().insert(provider.to_string());
            self.envs
                .lock()
                .unwrap()
                .insert(provider.to_string(), env.clone());
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn list_tools(&self, provider: &str) -> BoxFuture<'_, Result<Vec<ToolDefinition>, McpError>> {
        let result = if self.connected(provider) {
            *self
                .listings
                .lock()
                .unwrap()
                .entry(provider.to_string())
                .or_default() += 1;
            Ok(self.tools.lock().unwrap().get(provider).cloned().unwrap_or_default())
        } else {
            Err(McpError::ListToolsFailed {
                provider: provider.to_string(),
                message: "not connected".into(),
            })
        };
        Box::pin(async move { result })
    }

    fn call_tool(
        &self,
        provider: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> BoxFuture<'_, Result<ToolResult, McpError>> {
        let call = RecordedToolCall {
            provider: provider.to_string(),
            tool: tool.to_string(),
            arguments,
        };
        self.calls.lock().unwrap().push(call.clone());
        if let Some(hook) = &self.on_call {
            hook(&call);
        }
        let result = match self.tools.lock().unwrap().get(provider) {
            Some(tools) if tools.iter().any(|t| t.name == tool) => Ok(self
                .responses
                .get(&(provider.to_string(), tool.to_string()))
                .cloned()
                .unwrap_or_else(|| ToolResult::success("ok"))),
            Some(_) => Ok(ToolResult::error(format!("Unknown tool: {}", tool))),
            None => Err(McpError::Processing(format!("Unknown provider: {}", provider))),
        };
        Box::pin(async move { result })
    }

    fn tools_revision(&self, provider: &str) -> u64 {
        self.revisions.lock().unwrap().get(provider).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_list_and_call() {
        let client = StubToolClient::new()
            .with_tool("search", "lookup", "Look up")
            .with_response("search", "lookup", "found");

        assert!(client.list_tools("search").await.is_err());
        let env = HashMap::from([("TOKEN".to_string(), "t".to_string())]);
        client.connect("search", &env).await.unwrap();
        assert!(client.is_connected("search").await);
        assert_eq!(client.env_for("search").unwrap()["TOKEN"], "t");
        assert_eq!(client.list_tools("search").await.unwrap().len(), 1);

        let result = client
            .call_tool("search", "lookup", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("found"));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn changing_tools_bumps_revision() {
        let client = StubToolClient::new().with_tool("search", "lookup", "");
        assert_eq!(client.tools_revision("search"), 0);
        client.connect("search", &HashMap::new()).await.unwrap();

        client.change_tools("search", "summarize");
        assert_eq!(client.tools_revision("search"), 1);
        assert_eq!(client.list_tools("search").await.unwrap().len(), 2);
        assert_eq!(client.list_count("search"), 1);
    }

    #[tokio::test]
    async fn call_hook_sees_each_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let client = StubToolClient::new()
            .with_tool("search", "lookup", "")
            .on_call(move |call| sink.lock().unwrap().push(call.tool.clone()));

        client
            .call_tool("search", "lookup", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["lookup".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_providers_fail_to_connect() {
        let client = StubToolClient::new()
            .with_tool("search", "lookup", "")
            .failing_connect("search");
        assert!(client.connect("search", &HashMap::new()).await.is_err());
        assert!(client.connect("other", &HashMap::new()).await.is_err());
        assert!(!client.connected("search"));
    }
}
