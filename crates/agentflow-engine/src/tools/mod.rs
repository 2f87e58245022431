//! Tool discovery, namespacing, schema sanitization and invocation.

pub mod namespace;
pub mod orchestrator;
pub mod schema;

pub use namespace::{
    handoff_tool_name, is_handoff, namespaced, split_namespaced, HANDOFF_PREFIX, NAMESPACE_MARKER,
};
pub use orchestrator::{enabled_for, ToolCallOutcome, ToolOrchestrator};
pub use schema::{prepare_tools, sanitize_schema};
