use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by (or on behalf of) the completion model capability.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API key resolution failed for model {0}")]
    ApiKeyResolution(String),

    #[error("Upstream API error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        status: Option<u16>,
        error_type: Option<String>,
        code: Option<String>,
        param: Option<String>,
        message: String,
    },

    #[error("Model error: {0}")]
    Unknown(String),
}

impl ModelError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => "model_not_found",
            Self::ApiKeyResolution(_) => "api_key_resolution_failed",
            Self::Api { .. } => "upstream_api_error",
            Self::Unknown(_) => "unknown_model_error",
        }
    }
}

/// Failures while preparing or running tool calls.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Invalid tool: {0}")]
    InvalidTool(String),

    #[error("Tool preparation failed: {0}")]
    Preparation(String),

    #[error("Tool processing failed: {0}")]
    Processing(String),

    #[error("Invalid tool name format: {0}")]
    InvalidToolName(String),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTool(_) => "invalid_tool",
            Self::Preparation(_) => "tool_preparation_failed",
            Self::Processing(_) => "tool_processing_failed",
            Self::InvalidToolName(_) => "invalid_tool_name_format",
        }
    }
}

/// Failures tied to a node's configuration.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("Node {node_id} is missing required property '{property}'")]
    MissingProperty { node_id: String, property: String },

    #[error("Unknown node kind '{kind}' on node {node_id}")]
    UnknownKind { node_id: String, kind: String },
}

impl NodeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingProperty { .. } => "missing_required_property",
            Self::UnknownKind { .. } => "unknown_node_kind",
        }
    }
}

/// Failures talking to tool providers.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("Connection to tool provider '{provider}' failed: {message}")]
    ConnectionFailed { provider: String, message: String },

    #[error("Listing tools from '{provider}' failed: {message}")]
    ListToolsFailed { provider: String, message: String },

    #[error("MCP processing failed: {0}")]
    Processing(String),
}

impl McpError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "server_connection_failed",
            Self::ListToolsFailed { .. } => "list_tools_failed",
            Self::Processing(_) => "mcp_processing_failed",
        }
    }
}

/// Failures converting an authored flow into an executable graph.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("Flow has no start node")]
    NoStartNode,

    #[error("Flow has more than one start node: {}", .0.join(", "))]
    MultipleStartNodes(Vec<String>),

    #[error("Unknown node kind '{kind}' on node {node_id}")]
    UnknownNodeKind { node_id: String, kind: String },

    #[error("Edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Invalid properties on node {node_id}: {message}")]
    InvalidProperties { node_id: String, message: String },
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoStartNode => "no_start_node",
            Self::MultipleStartNodes(_) => "multiple_start_nodes",
            Self::UnknownNodeKind { .. } => "unknown_node_kind",
            Self::DanglingEdge { .. } => "dangling_edge",
            Self::InvalidProperties { .. } => "invalid_node_properties",
        }
    }
}

impl From<NodeError> for GraphError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::UnknownKind { node_id, kind } => Self::UnknownNodeKind { node_id, kind },
            NodeError::MissingProperty { node_id, property } => Self::InvalidProperties {
                node_id,
                message: format!("missing '{}'", property),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    // Executor errors
    #[error("Flow not registered: {0}")]
    FlowNotFound(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Conversation id is required")]
    MissingConversationId,

    #[error("Conversation {0} already has a step in progress")]
    ConversationBusy(String),

    #[error("Process node exceeded max tool iterations ({0})")]
    MaxIterationsExceeded(usize),

    #[error("Tool call {tool_call_id} is not pending on conversation {conversation_id}")]
    ToolCallNotPending {
        conversation_id: String,
        tool_call_id: String,
    },

    #[error("Execution failed: {0}")]
    Execution(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Which layer of the taxonomy the error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Model(_) => ErrorKind::Model,
            Self::Tool(_) => ErrorKind::Tool,
            Self::Node(_) => ErrorKind::Node,
            Self::Mcp(_) => ErrorKind::Mcp,
            Self::Graph(_) => ErrorKind::Graph,
            _ => ErrorKind::Execution,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Model(e) => e.code(),
            Self::Tool(e) => e.code(),
            Self::Node(e) => e.code(),
            Self::Mcp(e) => e.code(),
            Self::Graph(e) => e.code(),
            Self::FlowNotFound(_) => "flow_not_found",
            Self::ConversationNotFound(_) => "conversation_not_found",
            Self::MissingConversationId => "missing_conversation_id",
            Self::ConversationBusy(_) => "conversation_busy",
            Self::MaxIterationsExceeded(_) => "max_iterations_exceeded",
            Self::ToolCallNotPending { .. } => "tool_call_not_pending",
            Self::Execution(_) => "execution_failed",
            Self::Config(_) | Self::ConfigNotFound(_) => "config_error",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Model,
    Tool,
    Node,
    Mcp,
    Graph,
    Execution,
}

/// Serializable error snapshot stored on a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<&FlowError> for ErrorInfo {
    fn from(e: &FlowError) -> Self {
        Self {
            kind: e.kind(),
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ModelError::ModelNotFound("m".into()).code(), "model_not_found");
        assert_eq!(ToolError::InvalidTool("x".into()).code(), "invalid_tool");
        assert_eq!(
            McpError::Processing("boom".into()).code(),
            "mcp_processing_failed"
        );
        assert_eq!(
            NodeError::MissingProperty {
                node_id: "n1".into(),
                property: "bound_model".into()
            }
            .code(),
            "missing_required_property"
        );
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = ModelError::Api {
            status: Some(429),
            error_type: Some("rate_limit".into()),
            code: None,
            param: None,
            message: "slow down".into(),
        };
        assert_eq!(err.to_string(), "Upstream API error (429): slow down");
    }

    #[test]
    fn error_info_from_flow_error() {
        let err: FlowError = ToolError::InvalidToolName("bad".into()).into();
        let info = ErrorInfo::from(&err);
        assert_eq!(info.kind, ErrorKind::Tool);
        assert_eq!(info.code, "invalid_tool_name_format");
        assert!(info.message.contains("bad"));
    }

    #[test]
    fn unknown_kind_maps_into_graph_error() {
        let err: GraphError = NodeError::UnknownKind {
            node_id: "n9".into(),
            kind: "Mystery".into(),
        }
        .into();
        assert!(matches!(err, GraphError::UnknownNodeKind { .. }));
    }
}
