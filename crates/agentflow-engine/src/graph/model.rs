use std::path::Path;

use serde::{Deserialize, Serialize};

use agentflow_core::error::{FlowError, Result};

/// A flow as authored on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

/// An authored node. `data` is the untyped property bag for its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Control flow between nodes.
    #[default]
    Routing,
    /// Makes a ToolProvider's tools available to a Process node.
    #[serde(alias = "toolBinding")]
    ToolBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: EdgeKind,
    /// Routing label. Falls back to the edge id.
    #[serde(default)]
    pub action: Option<String>,
}

impl FlowEdge {
    pub fn routing(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Routing,
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn label(&self) -> &str {
        self.action.as_deref().unwrap_or(&self.id)
    }
}

impl FlowGraph {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load an authored flow from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| {
            FlowError::Config(format!("invalid flow file {}: {}", path.display(), e))
        })
    }
}
