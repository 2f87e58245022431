use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use agentflow_core::error::McpError;
use agentflow_core::event::EventBus;
use agentflow_core::state::ConversationState;
use agentflow_core::traits::ToolProviderClient;
use agentflow_core::types::{DiscoveredTool, FlowEvent, ToolCall, ToolDefinition, ToolResult};

use super::namespace::{is_handoff, namespaced, split_namespaced};
use super::schema::sanitize_schema;
use crate::graph::ToolProviderRef;

/// What became of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    /// A handoff pseudo-tool; no provider was contacted.
    Handoff { tool_name: String },
    /// The provider was called (or the name was rejected); the result goes
    /// back to the model either way.
    Completed(ToolResult),
}

/// Discovers provider tools and dispatches namespaced tool calls.
#[derive(Clone)]
pub struct ToolOrchestrator {
    client: Arc<dyn ToolProviderClient>,
    events: Arc<EventBus>,
}

impl ToolOrchestrator {
    pub fn new(client: Arc<dyn ToolProviderClient>, events: Arc<EventBus>) -> Self {
        Self { client, events }
    }

    pub fn tools_revision(&self, provider: &str) -> u64 {
        self.client.tools_revision(provider)
    }

    /// Discover tools for every ref. Providers that cannot be connected are
    /// skipped; a listing failure aborts discovery.
    pub async fn discover_tools(
        &self,
        refs: &[ToolProviderRef],
    ) -> Result<Vec<DiscoveredTool>, McpError> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for provider_ref in refs {
            if let Some(tools) = self.discover_provider(provider_ref).await? {
                for tool in tools {
                    if seen.insert(tool.definition.name.clone()) {
                        all.push(tool);
                    }
                }
            }
        }
        Ok(all)
    }

    /// Discover one provider's tools, filtered to the ref's enabled set.
    /// `Ok(None)` means the provider was skipped.
    pub async fn discover_provider(
        &self,
        provider_ref: &ToolProviderRef,
    ) -> Result<Option<Vec<DiscoveredTool>>, McpError> {
        let listed = self.list_provider(provider_ref).await?;
        Ok(listed.map(|tools| enabled_for(provider_ref, tools)))
    }

    /// The ref's enabled tools, served from the conversation's cache while
    /// the provider's tool list is unchanged. The cache holds the full
    /// listing so refs enabling different subsets share one entry.
    pub async fn provider_tools(
        &self,
        state: &mut ConversationState,
        provider_ref: &ToolProviderRef,
    ) -> Result<Option<Vec<DiscoveredTool>>, McpError> {
        let provider = provider_ref.bound_provider.as_str();
        let revision = self.tools_revision(provider);

        let all = match state.cached_tools(provider, revision) {
            Some(cached) => cached.to_vec(),
            None => {
                if state.tool_cache.contains_key(provider) {
                    debug!(provider = %provider, revision, "Tool list changed, rediscovering");
                }
                let Some(listed) = self.list_provider(provider_ref).await? else {
                    return Ok(None);
                };
                state.cache_tools(provider, listed.clone(), revision);
                listed
            }
        };
        Ok(Some(enabled_for(provider_ref, all)))
    }

    /// Connect if needed and list every tool the provider exposes,
    /// namespaced and sanitized. `Ok(None)` means the provider was skipped.
    pub async fn list_provider(
        &self,
        provider_ref: &ToolProviderRef,
    ) -> Result<Option<Vec<DiscoveredTool>>, McpError> {
        let provider = provider_ref.bound_provider.as_str();

        if !self.client.is_connected(provider).await {
            if let Err(e) = self.client.connect(provider, &provider_ref.env).await {
                warn!(provider = %provider, error = %e, "Tool provider unavailable, skipping");
                self.events.publish(FlowEvent::ProviderSkipped {
                    provider: provider.to_string(),
                    reason: e.to_string(),
                });
                return Ok(None);
            }
        }

        let listed = self
            .client
            .list_tools(provider)
            .await
            .map_err(|e| McpError::Processing(e.to_string()))?;

        let mut seen = HashSet::new();
        let tools: Vec<DiscoveredTool> = listed
            .into_iter()
            .filter_map(|t| {
                let name = namespaced(provider, &t.name);
                seen.insert(name.clone()).then(|| DiscoveredTool {
                    provider: provider.to_string(),
                    original_name: t.name.clone(),
                    definition: ToolDefinition {
                        name,
                        description: t.description,
                        input_schema: sanitize_schema(&t.input_schema),
                    },
                })
            })
            .collect();

        debug!(provider = %provider, count = tools.len(), "Discovered tools");
        Ok(Some(tools))
    }

    /// Run one tool call requested by the model.
    pub async fn invoke_tool_call(
        &self,
        conversation_id: &str,
        call: &ToolCall,
    ) -> ToolCallOutcome {
        if is_handoff(&call.name) {
            return ToolCallOutcome::Handoff {
                tool_name: call.name.clone(),
            };
        }

        let (provider, tool) = match split_namespaced(&call.name) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(tool = %call.name, "Model called a tool with an invalid name");
                return ToolCallOutcome::Completed(ToolResult::error(e.to_string()));
            }
        };

        self.events.publish(FlowEvent::ToolStart {
            conversation_id: conversation_id.to_string(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        info!(provider = %provider, tool = %tool, call_id = %call.id, "Invoking tool");

        let result = match self
            .client
            .call_tool(provider, tool, call.arguments.clone())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(provider = %provider, tool = %tool, error = %e, "Tool call failed");
                ToolResult::error(e.to_string())
            }
        };

        self.events.publish(FlowEvent::ToolEnd {
            conversation_id: conversation_id.to_string(),
            name: call.name.clone(),
            result: result.clone(),
        });
        ToolCallOutcome::Completed(result)
    }
}

/// Narrow a provider listing to the tools a ref enables; an empty
/// `enabled_tools` enables everything.
pub fn enabled_for(
    provider_ref: &ToolProviderRef,
    tools: Vec<DiscoveredTool>,
) -> Vec<DiscoveredTool> {
    if provider_ref.enabled_tools.is_empty() {
        return tools;
    }
    tools
        .into_iter()
        .filter(|t| provider_ref.enabled_tools.contains(&t.original_name))
        .collect()
}
