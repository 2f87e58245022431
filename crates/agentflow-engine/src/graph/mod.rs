//! Authored flow model and its conversion into an executable graph.
//!
//! A [`FlowGraph`] is what the canvas saves: nodes with untyped property
//! bags and edges that are either routing edges (control flow, labelled by
//! action) or tool-binding edges (Process ↔ ToolProvider). [`convert`]
//! turns it into an [`ExecutableGraph`] arena whose nodes carry typed
//! [`NodeSpec`]s and ordered successor lists.

pub mod convert;
pub mod model;
pub mod properties;

pub use convert::{convert, ExecNode, ExecutableGraph, Successor};
pub use model::{EdgeKind, FlowEdge, FlowGraph, FlowNode};
pub use properties::{
    NodeKind, NodeSpec, ProcessProps, StartProps, ToolProviderProps, ToolProviderRef,
};
