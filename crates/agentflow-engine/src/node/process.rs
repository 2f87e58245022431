//! Process node: one model-driven turn of the conversation.
//!
//! A turn loops model call → tool calls → tool results until the model gives
//! a plain answer, picks a handoff, needs approval, is cancelled or runs out
//! of iterations. Every message is appended to the state as soon as it
//! exists, so a pause or a fault keeps the progress made so far.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use agentflow_core::error::{FlowError, NodeError, Result};
use agentflow_core::state::ConversationState;
use agentflow_core::types::{
    Action, ChatMessage, DiscoveredTool, FlowEvent, ToolCall, ToolResult, ToolSpec,
};

use super::prompt::{compose_system_prompt, render, template_vars};
use super::NodeContext;
use crate::graph::{ExecNode, ProcessProps, ToolProviderRef};
use crate::tools::{handoff_tool_name, is_handoff, prepare_tools, split_namespaced, ToolCallOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct Handoff {
    pub tool_name: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessPrep {
    pub node_id: String,
    pub model_id: String,
    pub template: String,
    /// `None` when excluded by the node or not set.
    pub start_prompt: Option<String>,
    pub model_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub provider_refs: Vec<ToolProviderRef>,
    pub require_approval: bool,
    /// Offered only when the node has more than one successor.
    pub handoffs: Vec<Handoff>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    FinalResponse { content: String, model_calls: usize },
    Handoff { label: String, model_calls: usize },
    AwaitingApproval { pending: usize, model_calls: usize },
    Cancelled { model_calls: usize },
}

/// Where the turn loop stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessTurnPhase {
    AwaitingModel,
    AwaitingApproval { pending: usize },
    Done(ProcessOutcome),
}

pub fn prepare(
    ctx: &NodeContext,
    node: &ExecNode,
    props: &ProcessProps,
    state: &ConversationState,
) -> std::result::Result<ProcessPrep, NodeError> {
    let model_id = props
        .bound_model
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| NodeError::MissingProperty {
            node_id: node.id.clone(),
            property: "bound_model".to_string(),
        })?;

    let start_prompt = if props.exclude_start_prompt {
        None
    } else {
        state.start_prompt.clone()
    };
    let model_prompt = if props.exclude_model_prompt {
        None
    } else {
        ctx.config.model_prompt(model_id).map(str::to_string)
    };

    let handoffs = if node.successors.len() > 1 {
        node.successors
            .iter()
            .map(|s| Handoff {
                tool_name: handoff_tool_name(&s.label),
                label: s.label.clone(),
            })
            .collect()
    } else {
        vec![]
    };

    Ok(ProcessPrep {
        node_id: node.id.clone(),
        model_id: model_id.to_string(),
        template: props.prompt_template.clone(),
        start_prompt,
        model_prompt,
        allowed_tools: props.allowed_tools.clone(),
        provider_refs: props.tool_provider_refs.clone(),
        require_approval: props.require_approval || ctx.config.approval.require_approval,
        handoffs,
    })
}

pub async fn execute(
    ctx: &NodeContext,
    prep: &ProcessPrep,
    state: &mut ConversationState,
) -> Result<ProcessOutcome> {
    let vars = template_vars(state);
    let node_prompt = render(&prep.template, &vars);
    let system_prompt = compose_system_prompt(&[
        prep.start_prompt.as_deref(),
        prep.model_prompt.as_deref(),
        Some(node_prompt.as_str()),
    ]);

    if let Some(label) = state.pending_handoff.take() {
        if prep.handoffs.iter().any(|h| h.label == label) {
            info!(
                conversation_id = %state.id,
                label = %label,
                "Taking handoff chosen before approval"
            );
            return Ok(ProcessOutcome::Handoff {
                label,
                model_calls: 0,
            });
        }
        warn!(
            conversation_id = %state.id,
            label = %label,
            "Dropping handoff with no matching route"
        );
    }

    let tools = resolve_tools(ctx, prep, state).await?;
    let definitions: Vec<_> = tools.iter().map(|t| t.definition.clone()).collect();
    let mut specs = prepare_tools(&definitions)?;
    specs.extend(prep.handoffs.iter().map(handoff_spec));

    let mut model_calls = 0;
    let mut phase = ProcessTurnPhase::AwaitingModel;
    loop {
        phase = match phase {
            ProcessTurnPhase::AwaitingModel => {
                model_turn(ctx, prep, state, &system_prompt, &specs, &mut model_calls).await?
            }
            ProcessTurnPhase::AwaitingApproval { pending } => {
                return Ok(ProcessOutcome::AwaitingApproval {
                    pending,
                    model_calls,
                })
            }
            ProcessTurnPhase::Done(outcome) => return Ok(outcome),
        };
    }
}

pub fn finalize(outcome: &ProcessOutcome) -> Action {
    match outcome {
        ProcessOutcome::FinalResponse { .. } => Action::FinalResponse,
        ProcessOutcome::Handoff { label, .. } => Action::Edge(label.clone()),
        ProcessOutcome::AwaitingApproval { .. } => Action::ToolCall,
        ProcessOutcome::Cancelled { .. } => Action::StayOnNode,
    }
}

/// One model call and the tool calls it asked for.
async fn model_turn(
    ctx: &NodeContext,
    prep: &ProcessPrep,
    state: &mut ConversationState,
    system_prompt: &str,
    specs: &[ToolSpec],
    model_calls: &mut usize,
) -> Result<ProcessTurnPhase> {
    if ctx.cancel_requested(state) {
        state.cancelled = true;
        info!(conversation_id = %state.id, node_id = %prep.node_id, "Turn cancelled");
        return Ok(ProcessTurnPhase::Done(ProcessOutcome::Cancelled {
            model_calls: *model_calls,
        }));
    }

    let max = ctx.config.engine.max_tool_iterations;
    if *model_calls >= max {
        return Err(FlowError::MaxIterationsExceeded(max));
    }
    *model_calls += 1;

    let mut messages = Vec::with_capacity(state.messages.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.extend(state.messages.iter().cloned());

    let completion = ctx.model.complete(&prep.model_id, messages, specs).await?;
    debug!(
        node_id = %prep.node_id,
        tool_calls = completion.tool_calls.len(),
        "Model responded"
    );
    state.push_message(
        ChatMessage::assistant(completion.content.clone(), completion.tool_calls.clone())
            .from_node(&prep.node_id),
    );

    if completion.tool_calls.is_empty() {
        return Ok(ProcessTurnPhase::Done(ProcessOutcome::FinalResponse {
            content: completion.content,
            model_calls: *model_calls,
        }));
    }

    let mut gated: Vec<ToolCall> = Vec::new();
    let mut handoff: Option<String> = None;

    for call in completion.tool_calls {
        // Calls after a cancellation are answered without running so every
        // call in the assistant message keeps a result.
        if ctx.cancel_requested(state) {
            let result = ToolResult::error("Tool call skipped: conversation cancelled");
            push_result(state, prep, &call, &result);
            continue;
        }

        if is_handoff(&call.name) {
            let result = match prep.handoffs.iter().find(|h| h.tool_name == call.name) {
                Some(h) => {
                    handoff.get_or_insert_with(|| h.label.clone());
                    ToolResult::success(format!("Handing off to {}", h.label))
                }
                None => ToolResult::error(format!("Unknown handoff target: {}", call.name)),
            };
            push_result(state, prep, &call, &result);
            continue;
        }

        // Unparseable names are answered directly by the orchestrator.
        if prep.require_approval && split_namespaced(&call.name).is_ok() {
            ctx.events.publish(FlowEvent::ApprovalRequested {
                conversation_id: state.id.clone(),
                tool_call: call.clone(),
            });
            gated.push(call);
            continue;
        }

        if let ToolCallOutcome::Completed(result) =
            ctx.tools.invoke_tool_call(&state.id, &call).await
        {
            push_result(state, prep, &call, &result);
        }
    }

    if !gated.is_empty() {
        let pending = gated.len();
        info!(conversation_id = %state.id, pending, "Tool calls awaiting approval");
        state.pending_handoff = handoff;
        state.await_approval(gated);
        return Ok(ProcessTurnPhase::AwaitingApproval { pending });
    }

    Ok(match handoff {
        Some(label) => ProcessTurnPhase::Done(ProcessOutcome::Handoff {
            label,
            model_calls: *model_calls,
        }),
        None => ProcessTurnPhase::AwaitingModel,
    })
}

/// Tools visible to the model: each ref's enabled provider tools, cached
/// or freshly discovered, narrowed to the node's allow-list.
async fn resolve_tools(
    ctx: &NodeContext,
    prep: &ProcessPrep,
    state: &mut ConversationState,
) -> Result<Vec<DiscoveredTool>> {
    let mut seen = HashSet::new();
    let mut tools = Vec::new();

    for provider_ref in &prep.provider_refs {
        let Some(provider_tools) = ctx.tools.provider_tools(state, provider_ref).await? else {
            continue;
        };
        for tool in provider_tools {
            if seen.insert(tool.definition.name.clone()) {
                tools.push(tool);
            }
        }
    }

    if !prep.allowed_tools.is_empty() {
        tools.retain(|t| {
            prep.allowed_tools
                .iter()
                .any(|a| *a == t.definition.name || *a == t.original_name)
        });
    }
    Ok(tools)
}

fn push_result(
    state: &mut ConversationState,
    prep: &ProcessPrep,
    call: &ToolCall,
    result: &ToolResult,
) {
    state.push_message(ChatMessage::tool_result(&call.id, result).from_node(&prep.node_id));
}

fn handoff_spec(handoff: &Handoff) -> ToolSpec {
    ToolSpec::function(
        &handoff.tool_name,
        format!("Hand the conversation off along the '{}' route.", handoff.label),
        serde_json::json!({"type": "object", "properties": {}}),
    )
}
