//! Node lifecycle: every node kind runs `prepare → execute → finalize`.
//!
//! [`run_node`] is the single driver; it dispatches on the node's
//! [`NodeSpec`](crate::graph::NodeSpec) and threads the phase results
//! ([`PrepResult`], [`ExecResult`]) from one phase to the next. Both are
//! serializable so debug records can show them.

pub mod finish;
pub mod process;
pub mod prompt;
pub mod start;
pub mod tool_provider;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use agentflow_core::config::AppConfig;
use agentflow_core::error::Result;
use agentflow_core::event::EventBus;
use agentflow_core::state::ConversationState;
use agentflow_core::traits::CompletionModel;
use agentflow_core::types::{Action, DiscoveredTool};

use crate::graph::{ExecNode, NodeSpec, ToolProviderRef};
use crate::locks::ConversationLocks;
use crate::tools::ToolOrchestrator;

pub use process::{ProcessOutcome, ProcessPrep, ProcessTurnPhase};

/// Capabilities and settings shared by every node run.
#[derive(Clone)]
pub struct NodeContext {
    pub model: Arc<dyn CompletionModel>,
    pub tools: ToolOrchestrator,
    pub config: Arc<AppConfig>,
    pub events: Arc<EventBus>,
    pub locks: Arc<ConversationLocks>,
}

impl NodeContext {
    /// Cancellation is either persisted on the state or requested while the
    /// step is running.
    pub fn cancel_requested(&self, state: &ConversationState) -> bool {
        state.cancelled || self.locks.cancel_requested(&state.id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrepResult {
    Start { prompt: String },
    Process(ProcessPrep),
    ToolProvider { provider_ref: ToolProviderRef },
    Finish,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecResult {
    Start {
        prompt: String,
    },
    Process {
        outcome: ProcessOutcome,
    },
    ToolProvider {
        provider: String,
        tools: Vec<DiscoveredTool>,
        /// The provider could not be reached; the cache is left alone.
        skipped: bool,
    },
    Finish,
}

/// Everything one node run produced.
#[derive(Debug, Clone)]
pub struct NodeRun {
    pub action: Action,
    pub prep: PrepResult,
    pub exec: ExecResult,
}

/// Run one node through its three phases against `state`.
pub async fn run_node(
    ctx: &NodeContext,
    node: &ExecNode,
    state: &mut ConversationState,
) -> Result<NodeRun> {
    let prep = match &node.spec {
        NodeSpec::Start(props) => start::prepare(props, state),
        NodeSpec::Process(props) => PrepResult::Process(process::prepare(ctx, node, props, state)?),
        NodeSpec::ToolProvider(props) => tool_provider::prepare(node, props)?,
        NodeSpec::Finish => PrepResult::Finish,
    };

    let exec = match &prep {
        PrepResult::Start { prompt } => ExecResult::Start {
            prompt: prompt.clone(),
        },
        PrepResult::Process(p) => ExecResult::Process {
            outcome: process::execute(ctx, p, state).await?,
        },
        PrepResult::ToolProvider { provider_ref } => {
            tool_provider::execute(ctx, provider_ref, state).await?
        }
        PrepResult::Finish => ExecResult::Finish,
    };

    let action = match &exec {
        ExecResult::Start { prompt } => start::finalize(node, prompt, state),
        ExecResult::Process { outcome } => process::finalize(outcome),
        ExecResult::ToolProvider { .. } => tool_provider::finalize(node),
        ExecResult::Finish => finish::finalize(state),
    };

    debug!(node_id = %node.id, kind = node.spec.kind_name(), action = %action, "Node finalized");
    Ok(NodeRun { action, prep, exec })
}

/// The action a node returns when it has nothing specific to say: the first
/// successor's label, or `default` when there is none.
pub(crate) fn default_action(node: &ExecNode) -> Action {
    node.successors
        .first()
        .map(|s| Action::Edge(s.label.clone()))
        .unwrap_or(Action::Default)
}

/// Resolve the node to run next for `action`, or `None` to halt.
///
/// Re-entering actions stay on `node`. Otherwise an exact label match wins,
/// and anything unmatched falls back to the first successor in edge order.
pub fn resolve_next(node: &ExecNode, action: &Action) -> Option<String> {
    if action.reenters() {
        return Some(node.id.clone());
    }
    if *action == Action::Error {
        return None;
    }
    if let Some(succ) = node.successor(action.as_str()) {
        return Some(succ.target.clone());
    }
    if *action == Action::Default {
        return None;
    }

    let first = node.successors.first()?;
    if matches!(action, Action::Edge(_)) {
        warn!(
            node_id = %node.id,
            action = %action,
            fallback = %first.label,
            "No successor matches action, taking first edge"
        );
    }
    Some(first.target.clone())
}
