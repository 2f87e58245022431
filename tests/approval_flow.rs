use std::sync::Arc;

use serde_json::json;

use agentflow_core::config::AppConfig;
use agentflow_core::event::EventBus;
use agentflow_core::state::ExecutionStatus;
use agentflow_core::types::{Action, Completion, FlowEvent, Role, ToolCall};
use agentflow_engine::{ApprovalDecision, ApprovalGate, FlowGraph, StepExecutor};
use agentflow_store::MemoryConversationStore;
use agentflow_test_utils::{fixtures, ScriptedModel, StubToolClient};

struct Setup {
    executor: Arc<StepExecutor>,
    tools: Arc<StubToolClient>,
    gate: ApprovalGate,
    events: Arc<EventBus>,
}

fn setup(script: Vec<Completion>, config: AppConfig, node_requires_approval: bool) -> Setup {
    let tools = Arc::new(
        StubToolClient::new()
            .with_tool("search", "lookup", "Look things up")
            .with_response("search", "lookup", "Paris"),
    );
    let events = Arc::new(EventBus::default());
    let executor = Arc::new(StepExecutor::new(
        Arc::new(ScriptedModel::new(script)),
        tools.clone(),
        Arc::new(MemoryConversationStore::new()),
        Arc::new(config),
        events.clone(),
    ));
    let flow: FlowGraph =
        serde_json::from_value(fixtures::tool_flow(node_requires_approval)).expect("fixture");
    executor.register_flow(&flow).expect("register");
    Setup {
        gate: ApprovalGate::new(executor.clone()),
        executor,
        tools,
        events,
    }
}

fn lookup_call() -> ToolCall {
    ToolCall::new("call_1", "_-_-_search_-_-_lookup", json!({"q": "capital of France"}))
}

#[tokio::test]
async fn test_pause_approve_and_advance() {
    let s = setup(
        vec![
            Completion::with_tool_calls("", vec![lookup_call()]),
            Completion::text("The capital is Paris."),
        ],
        AppConfig::default(),
        true,
    );
    let mut rx = s.events.subscribe();
    s.executor
        .start_conversation(Some("c1".into()), "tools", Some("capital of France?"))
        .await
        .expect("start");

    let paused = s.executor.run("c1", 10).await.expect("run");
    assert_eq!(paused.action, Action::ToolCall);
    assert_eq!(paused.state.status, ExecutionStatus::AwaitingToolApproval);
    assert_eq!(paused.state.pending_tool_calls, vec![lookup_call()]);
    assert_eq!(s.tools.call_count(), 0);

    // Stepping while paused does nothing.
    let again = s.executor.step("c1").await.expect("step");
    assert_eq!(again.action, Action::ToolCall);

    let pending = s.gate.pending("c1").await.expect("pending");
    assert_eq!(pending.len(), 1);
    let state = s
        .gate
        .resolve("c1", &pending[0].id, ApprovalDecision::Approve)
        .await
        .expect("approve");
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(s.tools.call_count(), 1);
    assert_eq!(s.tools.calls()[0].arguments, json!({"q": "capital of France"}));

    let done = s.executor.run("c1", 10).await.expect("resume");
    assert_eq!(done.state.status, ExecutionStatus::Completed);
    assert_eq!(done.state.last_response.as_deref(), Some("The capital is Paris."));

    let roles: Vec<Role> = done.state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );

    let mut requested = false;
    let mut resolved = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            FlowEvent::ApprovalRequested { .. } => requested = true,
            FlowEvent::ApprovalResolved { approved, .. } => resolved = approved,
            _ => {}
        }
    }
    assert!(requested && resolved);
}

#[tokio::test]
async fn test_reject_never_invokes_provider() {
    let s = setup(
        vec![
            Completion::with_tool_calls("", vec![lookup_call()]),
            Completion::text("Understood, I will not search."),
        ],
        AppConfig::default(),
        true,
    );
    s.executor
        .start_conversation(Some("c1".into()), "tools", Some("capital of France?"))
        .await
        .expect("start");
    s.executor.run("c1", 10).await.expect("run");

    let state = s
        .gate
        .resolve("c1", "call_1", ApprovalDecision::Reject { reason: None })
        .await
        .expect("reject");
    assert_eq!(s.tools.call_count(), 0);
    let rejection = state.messages.last().expect("tool result");
    assert_eq!(rejection.role, Role::Tool);
    assert!(rejection.is_error);
    assert_eq!(rejection.tool_call_id.as_deref(), Some("call_1"));

    let done = s.executor.run("c1", 10).await.expect("resume");
    assert_eq!(done.state.status, ExecutionStatus::Completed);
    assert_eq!(s.tools.call_count(), 0);
}

#[tokio::test]
async fn test_global_policy_gates_ungated_nodes() {
    let mut config = AppConfig::default();
    config.approval.require_approval = true;
    let s = setup(
        vec![Completion::with_tool_calls("", vec![lookup_call()])],
        config,
        false,
    );
    s.executor
        .start_conversation(Some("c1".into()), "tools", Some("capital of France?"))
        .await
        .expect("start");

    let paused = s.executor.run("c1", 10).await.expect("run");
    assert_eq!(paused.state.status, ExecutionStatus::AwaitingToolApproval);
    assert_eq!(s.tools.call_count(), 0);
}

#[tokio::test]
async fn test_ungated_flow_calls_tools_directly() {
    let s = setup(
        vec![
            Completion::with_tool_calls("", vec![lookup_call()]),
            Completion::text("Paris."),
        ],
        AppConfig::default(),
        false,
    );
    s.executor
        .start_conversation(Some("c1".into()), "tools", Some("capital of France?"))
        .await
        .expect("start");

    let done = s.executor.run("c1", 10).await.expect("run");
    assert_eq!(done.state.status, ExecutionStatus::Completed);
    assert_eq!(s.tools.call_count(), 1);
    assert!(done.state.pending_tool_calls.is_empty());
}
