use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use agentflow_core::state::ConversationState;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Values available to `{{name}}` placeholders.
pub fn template_vars(state: &ConversationState) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = state
        .variables
        .iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();
    vars.insert("conversation_id".into(), state.id.clone());
    vars.insert("flow_id".into(), state.flow_id.clone());
    vars.insert(
        "last_user_message".into(),
        state.last_user_text().unwrap_or_default().to_string(),
    );
    vars
}

/// Substitute `{{name}}` placeholders. Unknown names are left in place.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Join the non-empty prompt parts: start prompt, model prompt, node prompt.
pub fn compose_system_prompt(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
