//! Persisted conversation state: the unit of resumption.
//!
//! An external storage layer reads and writes [`ConversationState`] verbatim;
//! everything the engine needs to continue a conversation lives here rather
//! than on a call stack.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;
use crate::types::{Action, ChatMessage, DiscoveredTool, Role, ToolCall};

/// Execution status of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    AwaitingToolApproval,
    PausedDebug,
    Completed,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::AwaitingToolApproval => "awaiting_tool_approval",
            Self::PausedDebug => "paused_debug",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One recorded node turn (debug mode only). Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub node_id: String,
    pub node_kind: String,
    pub node_name: String,
    pub action: Action,
    pub prep_result: serde_json::Value,
    pub exec_result: serde_json::Value,
    pub state_before: serde_json::Value,
    pub state_after: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    pub flow_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// The node run by the most recent step.
    #[serde(default)]
    pub current_node_id: Option<String>,
    /// Resume point resolved from the most recent action.
    #[serde(default)]
    pub next_node_id: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCall>,
    /// Provider name → every namespaced tool from the last discovery,
    /// before any per-reference filtering.
    #[serde(default)]
    pub tool_cache: HashMap<String, Vec<DiscoveredTool>>,
    /// Provider tool-list revision each cache entry was listed at.
    #[serde(default)]
    pub tool_cache_revisions: HashMap<String, u64>,
    /// Handoff label chosen in a turn that paused for approval; taken when
    /// the Process node is re-entered.
    #[serde(default)]
    pub pending_handoff: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub debug_trace: Vec<StepRecord>,
    /// Free-form values available to prompt templates.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub start_prompt: Option<String>,
    #[serde(default)]
    pub last_response: Option<String>,
    #[serde(default)]
    pub last_error: Option<ErrorInfo>,
    #[serde(default)]
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            flow_id: flow_id.into(),
            messages: vec![],
            current_node_id: None,
            next_node_id: None,
            status: ExecutionStatus::Running,
            pending_tool_calls: vec![],
            tool_cache: HashMap::new(),
            tool_cache_revisions: HashMap::new(),
            pending_handoff: None,
            cancelled: false,
            debug_mode: false,
            debug_trace: vec![],
            variables: HashMap::new(),
            start_prompt: None,
            last_response: None,
            last_error: None,
            step_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    pub fn push_message(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn last_message_with_role(&self, role: Role) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.last_message_with_role(Role::User)
            .map(|m| m.content.as_str())
    }

    /// Pause for approval of `calls`. An empty list leaves the state running.
    pub fn await_approval(&mut self, calls: Vec<ToolCall>) {
        if calls.is_empty() {
            return;
        }
        self.pending_tool_calls = calls;
        self.status = ExecutionStatus::AwaitingToolApproval;
        self.touch();
    }

    /// Remove one pending call; returns it if it was pending.
    /// Resolving the last call puts the conversation back into `running`.
    pub fn take_pending(&mut self, tool_call_id: &str) -> Option<ToolCall> {
        let idx = self
            .pending_tool_calls
            .iter()
            .position(|c| c.id == tool_call_id)?;
        let call = self.pending_tool_calls.remove(idx);
        if self.pending_tool_calls.is_empty()
            && self.status == ExecutionStatus::AwaitingToolApproval
        {
            self.status = ExecutionStatus::Running;
        }
        self.touch();
        Some(call)
    }

    /// Cached tools for `provider`, unless the provider's tool list has
    /// moved past the revision they were listed at.
    pub fn cached_tools(&self, provider: &str, revision: u64) -> Option<&[DiscoveredTool]> {
        let listed_at = self.tool_cache_revisions.get(provider).copied().unwrap_or(0);
        if listed_at != revision {
            return None;
        }
        self.tool_cache.get(provider).map(Vec::as_slice)
    }

    pub fn cache_tools(&mut self, provider: &str, tools: Vec<DiscoveredTool>, revision: u64) {
        self.tool_cache.insert(provider.to_string(), tools);
        self.tool_cache_revisions.insert(provider.to_string(), revision);
        self.touch();
    }

    pub fn fail(&mut self, error: ErrorInfo) {
        self.status = ExecutionStatus::Error;
        self.pending_tool_calls.clear();
        self.pending_handoff = None;
        self.last_error = Some(error);
        self.touch();
    }

    /// Pending calls exist exactly when awaiting approval.
    pub fn is_consistent(&self) -> bool {
        self.pending_tool_calls.is_empty() != (self.status == ExecutionStatus::AwaitingToolApproval)
    }

    /// JSON snapshot without the debug trace (keeps records from nesting).
    pub fn snapshot(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("debug_trace");
        }
        value
    }
}
