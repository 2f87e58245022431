//! Typed property bags, one per node kind.
//!
//! Canvas JSON uses camelCase keys; snake_case is accepted as well.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use agentflow_core::error::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Start,
    Process,
    ToolProvider,
    Finish,
}

impl FromStr for NodeKind {
    type Err = String;

    /// Case-insensitive; `_` and `-` are ignored ("tool_provider", "toolProvider").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "start" => Ok(Self::Start),
            "process" => Ok(Self::Process),
            "toolprovider" => Ok(Self::ToolProvider),
            "finish" => Ok(Self::Finish),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartProps {
    #[serde(alias = "prompt_template")]
    pub prompt_template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessProps {
    #[serde(alias = "prompt_template")]
    pub prompt_template: String,
    #[serde(alias = "bound_model")]
    pub bound_model: Option<String>,
    /// Tool names (namespaced or original) the model may see. Empty = all.
    #[serde(alias = "allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Providers bound to this node; extended from tool-binding edges.
    #[serde(alias = "tool_provider_refs")]
    pub tool_provider_refs: Vec<ToolProviderRef>,
    #[serde(alias = "exclude_model_prompt")]
    pub exclude_model_prompt: bool,
    #[serde(alias = "exclude_start_prompt")]
    pub exclude_start_prompt: bool,
    #[serde(alias = "require_approval")]
    pub require_approval: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolProviderProps {
    #[serde(alias = "bound_provider")]
    pub bound_provider: Option<String>,
    #[serde(alias = "enabled_tools")]
    pub enabled_tools: Vec<String>,
    /// Environment overrides applied when connecting.
    pub env: HashMap<String, String>,
}

impl ToolProviderProps {
    pub fn require_provider(&self, node_id: &str) -> Result<&str, NodeError> {
        self.bound_provider
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| NodeError::MissingProperty {
                node_id: node_id.to_string(),
                property: "bound_provider".to_string(),
            })
    }
}

/// A ToolProvider node's settings, as seen from a bound Process node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolProviderRef {
    pub id: String,
    #[serde(alias = "bound_provider")]
    pub bound_provider: String,
    #[serde(default, alias = "enabled_tools")]
    pub enabled_tools: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Tagged union over the node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    Start(StartProps),
    Process(ProcessProps),
    ToolProvider(ToolProviderProps),
    Finish,
}

impl NodeSpec {
    /// Parse the property bag for `kind`. A null bag means "all defaults".
    pub fn parse(node_id: &str, kind: &str, data: &serde_json::Value) -> Result<Self, ParseError> {
        let kind = NodeKind::from_str(kind).map_err(|kind| {
            ParseError::Node(NodeError::UnknownKind {
                node_id: node_id.to_string(),
                kind,
            })
        })?;

        let data = if data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            data.clone()
        };

        let spec = match kind {
            NodeKind::Start => Self::Start(serde_json::from_value(data)?),
            NodeKind::Process => Self::Process(serde_json::from_value(data)?),
            NodeKind::ToolProvider => Self::ToolProvider(serde_json::from_value(data)?),
            NodeKind::Finish => Self::Finish,
        };
        Ok(spec)
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Start(_) => NodeKind::Start,
            Self::Process(_) => NodeKind::Process,
            Self::ToolProvider(_) => NodeKind::ToolProvider,
            Self::Finish => NodeKind::Finish,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Process(_) => "process",
            Self::ToolProvider(_) => "tool_provider",
            Self::Finish => "finish",
        }
    }
}

#[derive(Debug)]
pub enum ParseError {
    Node(NodeError),
    Json(serde_json::Error),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
