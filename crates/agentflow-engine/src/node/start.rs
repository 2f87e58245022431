use agentflow_core::state::ConversationState;
use agentflow_core::types::Action;

use super::prompt::{render, template_vars};
use super::{default_action, PrepResult};
use crate::graph::{ExecNode, StartProps};

pub fn prepare(props: &StartProps, state: &ConversationState) -> PrepResult {
    PrepResult::Start {
        prompt: render(&props.prompt_template, &template_vars(state)),
    }
}

/// Record the start prompt for downstream Process nodes.
pub fn finalize(node: &ExecNode, prompt: &str, state: &mut ConversationState) -> Action {
    state.start_prompt = (!prompt.trim().is_empty()).then(|| prompt.to_string());
    state.touch();
    default_action(node)
}
