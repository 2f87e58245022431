use std::sync::Arc;

use tracing::info;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::state::ConversationState;
use agentflow_core::types::{ChatMessage, FlowEvent, ToolCall, ToolResult};

use crate::executor::StepExecutor;
use crate::tools::ToolCallOutcome;

/// The user's answer to a gated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject { reason: Option<String> },
}

/// Resolves tool calls parked by a Process node that requires approval.
///
/// Each resolution appends exactly one tool-result message. Once the last
/// pending call is resolved the conversation is `running` again and the
/// next step re-enters the Process node.
pub struct ApprovalGate {
    executor: Arc<StepExecutor>,
}

impl ApprovalGate {
    pub fn new(executor: Arc<StepExecutor>) -> Self {
        Self { executor }
    }

    pub async fn pending(&self, conversation_id: &str) -> Result<Vec<ToolCall>> {
        Ok(self.load(conversation_id).await?.pending_tool_calls)
    }

    /// Find a pending call by id prefix. The prefix must be unambiguous.
    pub async fn find_by_prefix(&self, conversation_id: &str, prefix: &str) -> Result<ToolCall> {
        let pending = self.pending(conversation_id).await?;
        let mut matches = pending.into_iter().filter(|c| c.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(call), None) => Ok(call),
            (Some(_), Some(_)) => Err(FlowError::Execution(format!(
                "Tool call prefix '{}' is ambiguous",
                prefix
            ))),
            (None, _) => Err(FlowError::ToolCallNotPending {
                conversation_id: conversation_id.to_string(),
                tool_call_id: prefix.to_string(),
            }),
        }
    }

    pub async fn resolve(
        &self,
        conversation_id: &str,
        tool_call_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ConversationState> {
        let _guard = self
            .executor
            .locks()
            .try_acquire(conversation_id)
            .ok_or_else(|| FlowError::ConversationBusy(conversation_id.to_string()))?;
        let mut state = self.load(conversation_id).await?;

        let call = state
            .take_pending(tool_call_id)
            .ok_or_else(|| FlowError::ToolCallNotPending {
                conversation_id: conversation_id.to_string(),
                tool_call_id: tool_call_id.to_string(),
            })?;

        let ctx = self.executor.context();
        let approved = decision == ApprovalDecision::Approve;
        let result = match decision {
            ApprovalDecision::Approve => {
                match ctx.tools.invoke_tool_call(&state.id, &call).await {
                    ToolCallOutcome::Completed(result) => result,
                    // Handoffs are never gated, but answer them anyway.
                    ToolCallOutcome::Handoff { tool_name } => {
                        ToolResult::success(format!("Handoff acknowledged: {}", tool_name))
                    }
                }
            }
            ApprovalDecision::Reject { reason } => {
                let base = &ctx.config.approval.rejection_message;
                match reason.filter(|r| !r.trim().is_empty()) {
                    Some(reason) => ToolResult::error(format!("{} Reason: {}", base, reason)),
                    None => ToolResult::error(base.clone()),
                }
            }
        };

        let mut message = ChatMessage::tool_result(call.id.clone(), &result);
        if let Some(node_id) = state.next_node_id.as_ref().or(state.current_node_id.as_ref()) {
            message = message.from_node(node_id.clone());
        }
        state.push_message(message);

        self.executor.store().put(&state).await?;

        ctx.events.publish(FlowEvent::ApprovalResolved {
            conversation_id: state.id.clone(),
            tool_call_id: call.id.clone(),
            approved,
        });
        info!(
            conversation_id = %state.id,
            tool_call_id = %call.id,
            tool = %call.name,
            approved,
            remaining = state.pending_tool_calls.len(),
            "Tool call resolved"
        );
        Ok(state)
    }

    async fn load(&self, id: &str) -> Result<ConversationState> {
        self.executor
            .store()
            .get(id)
            .await?
            .ok_or_else(|| FlowError::ConversationNotFound(id.to_string()))
    }
}
