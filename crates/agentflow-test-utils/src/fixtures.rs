//! Canvas documents for the common flow shapes.
//!
//! Returned as JSON so they go through the same deserialization path as a
//! saved flow file.

use serde_json::{json, Value};

/// `start → agent → finish`.
pub fn simple_flow() -> Value {
    json!({
        "id": "simple",
        "name": "Simple assistant",
        "nodes": [
            { "id": "start", "type": "start", "label": "Start",
              "data": { "promptTemplate": "You are a helpful assistant." } },
            { "id": "agent", "type": "process", "label": "Agent",
              "data": { "boundModel": "test-model", "promptTemplate": "Answer briefly." } },
            { "id": "finish", "type": "finish", "label": "Done" }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "agent" },
            { "id": "e2", "source": "agent", "target": "finish" }
        ]
    })
}

/// `start → agent → finish` with a `search` tool provider bound to the agent.
pub fn tool_flow(require_approval: bool) -> Value {
    json!({
        "id": "tools",
        "name": "Tool assistant",
        "nodes": [
            { "id": "start", "type": "start", "label": "Start" },
            { "id": "agent", "type": "process", "label": "Agent",
              "data": { "boundModel": "test-model", "requireApproval": require_approval } },
            { "id": "search", "type": "toolProvider", "label": "Search",
              "data": { "boundProvider": "search" } },
            { "id": "finish", "type": "finish", "label": "Done" }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "agent" },
            { "id": "e2", "source": "agent", "target": "finish" },
            { "id": "b1", "source": "agent", "target": "search", "type": "toolBinding" }
        ]
    })
}

/// A triage agent handing off to `billing` or `support`, both ending at `finish`.
pub fn branching_flow() -> Value {
    json!({
        "id": "branching",
        "name": "Triage",
        "nodes": [
            { "id": "start", "type": "start", "label": "Start" },
            { "id": "triage", "type": "process", "label": "Triage",
              "data": { "boundModel": "test-model", "promptTemplate": "Route the user." } },
            { "id": "billing", "type": "process", "label": "Billing",
              "data": { "boundModel": "test-model" } },
            { "id": "support", "type": "process", "label": "Support",
              "data": { "boundModel": "test-model" } },
            { "id": "finish", "type": "finish", "label": "Done" }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "triage" },
            { "id": "e2", "source": "triage", "target": "billing", "action": "billing" },
            { "id": "e3", "source": "triage", "target": "support", "action": "support" },
            { "id": "e4", "source": "billing", "target": "finish" },
            { "id": "e5", "source": "support", "target": "finish" }
        ]
    })
}
