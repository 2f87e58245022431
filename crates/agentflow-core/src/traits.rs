use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::error::{McpError, ModelError, Result};
use crate::state::ConversationState;
use crate::types::*;

/// Completion model: generates one completion from messages and tools.
pub trait CompletionModel: Send + Sync + 'static {
    fn complete(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        tools: &[ToolSpec],
    ) -> BoxFuture<'_, std::result::Result<Completion, ModelError>>;
}

/// Tool provider client: lists and invokes tools on named providers.
pub trait ToolProviderClient: Send + Sync + 'static {
    /// Whether a live connection to `provider` exists.
    fn is_connected(&self, provider: &str) -> BoxFuture<'_, bool>;

    /// Connect to `provider`, applying environment overrides.
    fn connect(
        &self,
        provider: &str,
        env: &HashMap<String, String>,
    ) -> BoxFuture<'_, std::result::Result<(), McpError>>;

    /// List tools exposed by a connected provider.
    fn list_tools(
        &self,
        provider: &str,
    ) -> BoxFuture<'_, std::result::Result<Vec<ToolDefinition>, McpError>>;

    /// Counter that moves whenever `provider` reports a changed tool list.
    /// Clients without change notifications keep it at zero.
    fn tools_revision(&self, _provider: &str) -> u64 {
        0
    }

    /// Invoke `tool` on `provider`. Tool-level failures come back as an
    /// error [`ToolResult`]; `Err` means the provider itself failed.
    fn call_tool(
        &self,
        provider: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> BoxFuture<'_, std::result::Result<ToolResult, McpError>>;
}

/// Conversation store: persistence backend keyed by conversation id.
pub trait ConversationStore: Send + Sync + 'static {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<ConversationState>>>;

    fn put(&self, state: &ConversationState) -> BoxFuture<'_, Result<()>>;

    /// Returns true if a conversation was removed.
    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>>;

    /// List stored conversation ids.
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>>;
}
