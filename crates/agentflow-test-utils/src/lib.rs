//! Test doubles for the capability traits plus ready-made flow documents.

pub mod fixtures;
mod model;
mod tools;

pub use model::{RecordedCompletion, ScriptedModel};
pub use tools::{RecordedToolCall, StubToolClient};
