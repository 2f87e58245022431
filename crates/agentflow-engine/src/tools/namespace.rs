use agentflow_core::error::ToolError;

/// Separates provider and tool in a namespaced tool name.
pub const NAMESPACE_MARKER: &str = "_-_-_";

/// Prefix of the pseudo-tools a Process node offers for routing.
pub const HANDOFF_PREFIX: &str = "handoff_to_";

/// `<marker><provider><marker><tool>`
pub fn namespaced(provider: &str, tool: &str) -> String {
    format!("{NAMESPACE_MARKER}{provider}{NAMESPACE_MARKER}{tool}")
}

/// Split a namespaced name into `(provider, tool)`.
///
/// The name must split into exactly three segments on the marker, the first
/// one empty.
pub fn split_namespaced(name: &str) -> Result<(&str, &str), ToolError> {
    let parts: Vec<&str> = name.split(NAMESPACE_MARKER).collect();
    match parts.as_slice() {
        ["", provider, tool] if !provider.is_empty() && !tool.is_empty() => Ok((*provider, *tool)),
        _ => Err(ToolError::InvalidToolName(name.to_string())),
    }
}

/// Tool name offered to the model for handing off along the edge `label`.
/// Characters outside `[A-Za-z0-9_-]` become `_`.
pub fn handoff_tool_name(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{HANDOFF_PREFIX}{safe}")
}

pub fn is_handoff(name: &str) -> bool {
    name.starts_with(HANDOFF_PREFIX)
}
