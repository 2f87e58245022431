use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Top-level agentflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Per-model settings keyed by model id.
    #[serde(default)]
    pub models: HashMap<String, ModelProfile>,
    #[serde(default)]
    pub mcp: Option<McpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on model calls a Process node makes in one turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Start new conversations with debug tracing on.
    #[serde(default)]
    pub default_debug_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            default_debug_mode: false,
        }
    }
}

fn default_max_tool_iterations() -> usize { 25 }

/// Human-in-the-loop approval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Gate every provider-backed tool call, regardless of node settings.
    #[serde(default)]
    pub require_approval: bool,
    /// Tool-result text recorded when a call is rejected.
    #[serde(default = "default_rejection_message")]
    pub rejection_message: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            require_approval: false,
            rejection_message: default_rejection_message(),
        }
    }
}

fn default_rejection_message() -> String {
    "Tool call was rejected by the user.".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database path. Default: ~/.agentflow/conversations.db
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String { "~/.agentflow/conversations.db".to_string() }

impl StoreConfig {
    /// Resolve the database path (expand ~).
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(rest) = self.path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.path)
    }
}

/// Settings for one model id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelProfile {
    /// System prompt contributed by the model itself.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// MCP (Model Context Protocol) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub transport: McpTransport,
    /// Per-tool-call timeout in seconds. Default: 120.
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 { 120 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))
    }

    /// System prompt configured for a model, if any.
    pub fn model_prompt(&self, model_id: &str) -> Option<&str> {
        self.models
            .get(model_id)
            .and_then(|m| m.system_prompt.as_deref())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
