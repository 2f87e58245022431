//! Flow execution engine.
//!
//! An authored [`FlowGraph`] is converted once into an immutable
//! [`ExecutableGraph`]. The [`StepExecutor`] then advances a persisted
//! [`ConversationState`](agentflow_core::ConversationState) one node at a
//! time, so a conversation can pause (tool approval, debug stepping) and
//! resume in a later request.

pub mod approval;
pub mod debug;
pub mod executor;
pub mod graph;
pub mod locks;
pub mod node;
pub mod tools;

pub use approval::{ApprovalDecision, ApprovalGate};
pub use debug::DebugTracer;
pub use executor::{StepExecutor, StepOutcome};
pub use graph::{convert, ExecNode, ExecutableGraph, FlowGraph, NodeSpec};
pub use locks::ConversationLocks;
pub use node::NodeContext;
pub use tools::ToolOrchestrator;
