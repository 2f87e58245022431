use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorInfo;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A chat message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-result messages: the id of the call this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    /// Node that produced this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: vec![],
            tool_call_id: None,
            is_error: false,
            node_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text.into())
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, text.into());
        msg.tool_calls = tool_calls;
        msg
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: &ToolResult) -> Self {
        let mut msg = Self::with_role(Role::Tool, result.content.clone());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.is_error = result.is_error;
        msg
    }

    /// Tag the message with the node that produced it.
    pub fn from_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// What the completion capability returns for one model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition as listed by a provider (or after namespacing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A provider tool after discovery: namespaced and sanitized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredTool {
    pub provider: String,
    pub original_name: String,
    pub definition: ToolDefinition,
}

/// Model-facing tool declaration (function-calling format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Routing action returned by a node's finalize phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Tool calls are pending; re-enter the same node once resolved.
    ToolCall,
    FinalResponse,
    Error,
    StayOnNode,
    /// No further node.
    Default,
    /// An edge label.
    Edge(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ToolCall => "TOOL_CALL",
            Self::FinalResponse => "FINAL_RESPONSE",
            Self::Error => "ERROR",
            Self::StayOnNode => "STAY_ON_NODE",
            Self::Default => "default",
            Self::Edge(label) => label,
        }
    }

    /// Whether the action re-runs the node that produced it.
    pub fn reenters(&self) -> bool {
        matches!(self, Self::ToolCall | Self::StayOnNode)
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "TOOL_CALL" => Self::ToolCall,
            "FINAL_RESPONSE" => Self::FinalResponse,
            "ERROR" => Self::Error,
            "STAY_ON_NODE" => Self::StayOnNode,
            "default" => Self::Default,
            other => Self::Edge(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Action::from(s.as_str()))
    }
}

/// Agent event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    StepStarted {
        conversation_id: String,
        node_id: String,
    },
    StepCompleted {
        conversation_id: String,
        node_id: String,
        action: Action,
    },
    StepFailed {
        conversation_id: String,
        error: ErrorInfo,
    },
    ToolStart {
        conversation_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolEnd {
        conversation_id: String,
        name: String,
        result: ToolResult,
    },
    /// A provider could not be connected during discovery and was skipped.
    ProviderSkipped { provider: String, reason: String },
    ApprovalRequested {
        conversation_id: String,
        tool_call: ToolCall,
    },
    ApprovalResolved {
        conversation_id: String,
        tool_call_id: String,
        approved: bool,
    },
}
