use agentflow_core::state::{ConversationState, ExecutionStatus};
use agentflow_core::types::{Action, Role};

/// Publish the last assistant answer and complete the conversation.
pub fn finalize(state: &mut ConversationState) -> Action {
    state.last_response = state
        .last_message_with_role(Role::Assistant)
        .map(|m| m.content.clone());
    state.status = ExecutionStatus::Completed;
    state.touch();
    Action::Default
}
