//! MCP adapter: exposes configured MCP servers through the
//! [`ToolProviderClient`](agentflow_core::traits::ToolProviderClient) capability.

mod client;
mod handler;

pub use client::McpClientManager;
pub use handler::{AgentflowClientHandler, ToolRevisions};
