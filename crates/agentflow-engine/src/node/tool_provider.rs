use agentflow_core::error::{NodeError, Result};
use agentflow_core::state::ConversationState;
use agentflow_core::types::Action;

use super::{default_action, ExecResult, NodeContext, PrepResult};
use crate::graph::{ExecNode, ToolProviderProps, ToolProviderRef};
use crate::tools::enabled_for;

pub fn prepare(
    node: &ExecNode,
    props: &ToolProviderProps,
) -> std::result::Result<PrepResult, NodeError> {
    let provider = props.require_provider(&node.id)?;
    Ok(PrepResult::ToolProvider {
        provider_ref: ToolProviderRef {
            id: node.id.clone(),
            bound_provider: provider.to_string(),
            enabled_tools: props.enabled_tools.clone(),
            env: props.env.clone(),
        },
    })
}

/// Connect if needed and list the provider's tools. The full listing is
/// cached on the state; the result carries the ref's enabled subset.
pub async fn execute(
    ctx: &NodeContext,
    provider_ref: &ToolProviderRef,
    state: &mut ConversationState,
) -> Result<ExecResult> {
    let provider = provider_ref.bound_provider.as_str();
    let revision = ctx.tools.tools_revision(provider);
    let listed = ctx.tools.list_provider(provider_ref).await?;
    let skipped = listed.is_none();
    if let Some(all) = &listed {
        state.cache_tools(provider, all.clone(), revision);
    }
    Ok(ExecResult::ToolProvider {
        provider: provider.to_string(),
        skipped,
        tools: enabled_for(provider_ref, listed.unwrap_or_default()),
    })
}

pub fn finalize(node: &ExecNode) -> Action {
    default_action(node)
}
