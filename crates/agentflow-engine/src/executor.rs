use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agentflow_core::config::AppConfig;
use agentflow_core::error::{ErrorInfo, FlowError, Result};
use agentflow_core::event::EventBus;
use agentflow_core::state::{ConversationState, ExecutionStatus, StepRecord};
use agentflow_core::traits::{CompletionModel, ConversationStore, ToolProviderClient};
use agentflow_core::types::{Action, ChatMessage, FlowEvent, Role};

use crate::graph::{convert, ExecNode, ExecutableGraph, FlowGraph, NodeKind};
use crate::locks::{ConversationGuard, ConversationLocks};
use crate::node::{resolve_next, run_node, NodeContext};
use crate::tools::ToolOrchestrator;

/// Result of one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: ConversationState,
    pub action: Action,
    /// Node the next step will run; `None` means the flow halted.
    pub next_node_id: Option<String>,
}

impl StepOutcome {
    fn halted(state: ConversationState, action: Action) -> Self {
        Self {
            state,
            action,
            next_node_id: None,
        }
    }
}

/// Advances conversations one node at a time.
///
/// Flows are registered once and shared as immutable [`ExecutableGraph`]s.
/// Each step loads nothing it was not given: callers pass the state in and
/// get the new state back, and the executor persists it through the
/// injected [`ConversationStore`].
pub struct StepExecutor {
    flows: RwLock<HashMap<String, Arc<ExecutableGraph>>>,
    store: Arc<dyn ConversationStore>,
    ctx: NodeContext,
}

impl StepExecutor {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        tools: Arc<dyn ToolProviderClient>,
        store: Arc<dyn ConversationStore>,
        config: Arc<AppConfig>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            store,
            ctx: NodeContext {
                model,
                tools: ToolOrchestrator::new(tools, events.clone()),
                config,
                events,
                locks: ConversationLocks::new(),
            },
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<ConversationLocks> {
        &self.ctx.locks
    }

    /// Convert and cache a flow, replacing any earlier version with the same id.
    pub fn register_flow(&self, flow: &FlowGraph) -> Result<Arc<ExecutableGraph>> {
        let graph = Arc::new(convert(flow)?);
        self.flows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(flow.id.clone(), graph.clone());
        info!(flow_id = %flow.id, nodes = graph.nodes().len(), "Flow registered");
        Ok(graph)
    }

    pub fn graph(&self, flow_id: &str) -> Result<Arc<ExecutableGraph>> {
        self.flows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(flow_id)
            .cloned()
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))
    }

    /// Create and persist a new conversation on a registered flow.
    pub async fn start_conversation(
        &self,
        id: Option<String>,
        flow_id: &str,
        user_message: Option<&str>,
    ) -> Result<ConversationState> {
        self.graph(flow_id)?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if id.trim().is_empty() {
            return Err(FlowError::MissingConversationId);
        }
        let _guard = self.claim(&id)?;

        if self.store.get(&id).await?.is_some() {
            return Err(FlowError::Execution(format!(
                "Conversation {} already exists",
                id
            )));
        }

        let mut state = ConversationState::new(id, flow_id)
            .with_debug(self.ctx.config.engine.default_debug_mode);
        if let Some(text) = user_message {
            state.push_message(ChatMessage::user(text));
        }
        self.store.put(&state).await?;
        info!(conversation_id = %state.id, flow_id = %flow_id, "Conversation started");
        Ok(state)
    }

    /// Append a user turn. A finished conversation is rewound to the last
    /// Process node that spoke so the next step answers the new message.
    pub async fn post_user_message(&self, id: &str, text: &str) -> Result<ConversationState> {
        let _guard = self.claim(id)?;
        let mut state = self.load(id).await?;

        if state.status == ExecutionStatus::AwaitingToolApproval {
            return Err(FlowError::Execution(format!(
                "Conversation {} has tool calls awaiting approval",
                id
            )));
        }
        if state.cancelled {
            return Err(FlowError::Execution(format!("Conversation {} was cancelled", id)));
        }

        state.push_message(ChatMessage::user(text));

        if state.status == ExecutionStatus::Completed || state.next_node_id.is_none() {
            let graph = self.graph(&state.flow_id)?;
            state.next_node_id = Some(resume_point(&graph, &state));
            state.last_response = None;
        }
        if matches!(
            state.status,
            ExecutionStatus::Completed | ExecutionStatus::Error
        ) {
            state.status = ExecutionStatus::Running;
            state.last_error = None;
        }

        self.store.put(&state).await?;
        Ok(state)
    }

    /// Run one node for `state` and persist the result.
    ///
    /// Never fails: faults come back as [`Action::Error`] with the error
    /// recorded on the (persisted) state. Two cases are not persisted: a
    /// state without an id and a conversation that is already busy.
    pub async fn execute_step(&self, mut state: ConversationState) -> StepOutcome {
        if state.id.trim().is_empty() {
            let err = FlowError::MissingConversationId;
            warn!("Step requested without a conversation id");
            state.last_error = Some(ErrorInfo::from(&err));
            return StepOutcome::halted(state, Action::Error);
        }

        let Some(_guard) = self.ctx.locks.try_acquire(&state.id) else {
            let err = FlowError::ConversationBusy(state.id.clone());
            warn!(conversation_id = %state.id, "Conversation busy, step refused");
            state.last_error = Some(ErrorInfo::from(&err));
            return StepOutcome::halted(state, Action::Error);
        };

        self.execute_claimed(state).await
    }

    /// Load a conversation and run one step.
    pub async fn step(&self, id: &str) -> Result<StepOutcome> {
        let _guard = self.claim(id)?;
        let state = self.load(id).await?;
        Ok(self.execute_claimed(state).await)
    }

    /// Step until the flow halts, pauses, fails or completes, or until
    /// `max_steps` steps have run.
    pub async fn run(&self, id: &str, max_steps: usize) -> Result<StepOutcome> {
        let _guard = self.claim(id)?;
        let state = self.load(id).await?;

        let mut outcome = self.execute_claimed(state).await;
        let mut steps = 1;
        while should_continue(&outcome) {
            if steps >= max_steps {
                warn!(conversation_id = %id, max_steps, "Step budget exhausted");
                break;
            }
            outcome = self.execute_claimed(outcome.state).await;
            steps += 1;
        }
        debug!(conversation_id = %id, steps, action = %outcome.action, "Run finished");
        Ok(outcome)
    }

    /// Cancel a conversation. A running step notices between tool-call
    /// iterations; an idle conversation is flagged immediately.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        match self.ctx.locks.try_acquire(id) {
            None => {
                self.ctx.locks.request_cancel(id);
                info!(conversation_id = %id, "Cancellation requested for busy conversation");
                Ok(())
            }
            Some(_guard) => {
                let mut state = self.load(id).await?;
                state.cancelled = true;
                state.touch();
                self.store.put(&state).await?;
                info!(conversation_id = %id, "Conversation cancelled");
                Ok(())
            }
        }
    }

    /// Toggle step recording. Turning it off releases a debug pause.
    pub async fn set_debug_mode(&self, id: &str, enabled: bool) -> Result<ConversationState> {
        let _guard = self.claim(id)?;
        let mut state = self.load(id).await?;
        state.debug_mode = enabled;
        if !enabled && state.status == ExecutionStatus::PausedDebug {
            state.status = ExecutionStatus::Running;
        }
        state.touch();
        self.store.put(&state).await?;
        Ok(state)
    }

    fn claim(&self, id: &str) -> Result<ConversationGuard> {
        self.ctx
            .locks
            .try_acquire(id)
            .ok_or_else(|| FlowError::ConversationBusy(id.to_string()))
    }

    async fn load(&self, id: &str) -> Result<ConversationState> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| FlowError::ConversationNotFound(id.to_string()))
    }

    async fn execute_claimed(&self, mut state: ConversationState) -> StepOutcome {
        if self.ctx.locks.take_cancel_request(&state.id) && !state.cancelled {
            state.cancelled = true;
            state.touch();
            if let Err(e) = self.store.put(&state).await {
                error!(conversation_id = %state.id, error = %e, "Failed to persist cancellation");
            }
        }

        let status = state.status;
        match status {
            ExecutionStatus::AwaitingToolApproval => {
                debug!(conversation_id = %state.id, "Awaiting tool approval, not stepping");
                let next = state.next_node_id.clone();
                return StepOutcome {
                    state,
                    action: Action::ToolCall,
                    next_node_id: next,
                };
            }
            ExecutionStatus::Completed => return StepOutcome::halted(state, Action::Default),
            _ if state.cancelled => return StepOutcome::halted(state, Action::Default),
            _ => {}
        }

        let graph = match self.graph(&state.flow_id) {
            Ok(graph) => graph,
            Err(e) => return self.fail(state, e).await,
        };
        let node = locate(&graph, &state);

        if matches!(
            state.status,
            ExecutionStatus::PausedDebug | ExecutionStatus::Error
        ) {
            state.status = ExecutionStatus::Running;
            state.last_error = None;
        }
        let before = state.debug_mode.then(|| state.snapshot());

        self.ctx.events.publish(FlowEvent::StepStarted {
            conversation_id: state.id.clone(),
            node_id: node.id.clone(),
        });
        info!(
            conversation_id = %state.id,
            node_id = %node.id,
            kind = node.spec.kind_name(),
            "Executing node"
        );

        let result = run_node(&self.ctx, node, &mut state).await;
        state.current_node_id = Some(node.id.clone());
        state.step_count += 1;
        if self.ctx.locks.take_cancel_request(&state.id) {
            state.cancelled = true;
        }

        let run = match result {
            Ok(run) => run,
            Err(e) => {
                if let Some(before) = before {
                    let exec = serde_json::json!({ "error": ErrorInfo::from(&e) });
                    let prep = serde_json::Value::Null;
                    record_step(&mut state, node, &Action::Error, prep, exec, before);
                }
                return self.fail(state, e).await;
            }
        };

        let next = resolve_next(node, &run.action);
        state.next_node_id = next.clone();

        if let Some(before) = before {
            if state.status == ExecutionStatus::Running {
                state.status = ExecutionStatus::PausedDebug;
            }
            let prep = serde_json::to_value(&run.prep).unwrap_or_default();
            let exec = serde_json::to_value(&run.exec).unwrap_or_default();
            record_step(&mut state, node, &run.action, prep, exec, before);
        }
        state.touch();

        if let Err(e) = self.store.put(&state).await {
            return self.fail(state, e).await;
        }

        self.ctx.events.publish(FlowEvent::StepCompleted {
            conversation_id: state.id.clone(),
            node_id: node.id.clone(),
            action: run.action.clone(),
        });

        StepOutcome {
            state,
            action: run.action,
            next_node_id: next,
        }
    }

    async fn fail(&self, mut state: ConversationState, err: FlowError) -> StepOutcome {
        error!(conversation_id = %state.id, code = err.code(), error = %err, "Step failed");
        let info = ErrorInfo::from(&err);
        state.next_node_id = None;
        state.fail(info.clone());

        if let Err(e) = self.store.put(&state).await {
            error!(conversation_id = %state.id, error = %e, "Failed to persist error state");
        }
        self.ctx.events.publish(FlowEvent::StepFailed {
            conversation_id: state.id.clone(),
            error: info,
        });
        StepOutcome::halted(state, Action::Error)
    }
}

fn should_continue(outcome: &StepOutcome) -> bool {
    outcome.action != Action::Error
        && outcome.action != Action::StayOnNode
        && outcome.state.status == ExecutionStatus::Running
        && !outcome.state.cancelled
        && outcome.next_node_id.is_some()
}

/// `next_node_id`, else `current_node_id`, else Start.
fn locate<'g>(graph: &'g ExecutableGraph, state: &ConversationState) -> &'g ExecNode {
    let Some(id) = state
        .next_node_id
        .as_deref()
        .or(state.current_node_id.as_deref())
    else {
        return graph.start();
    };

    match graph.find_reachable(id).or_else(|| graph.node(id)) {
        Some(node) => node,
        None => {
            warn!(
                node_id = %id,
                flow_id = %graph.flow_id,
                "Resume node not in flow, restarting from Start"
            );
            graph.start()
        }
    }
}

/// The Process node that produced the latest assistant message, falling
/// back to Start.
fn resume_point(graph: &ExecutableGraph, state: &ConversationState) -> String {
    state
        .messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .filter_map(|m| m.node_id.as_deref())
        .chain(state.current_node_id.as_deref())
        .filter_map(|id| graph.node(id))
        .find(|n| n.spec.kind() == NodeKind::Process)
        .unwrap_or_else(|| graph.start())
        .id
        .clone()
}

fn record_step(
    state: &mut ConversationState,
    node: &ExecNode,
    action: &Action,
    prep_result: serde_json::Value,
    exec_result: serde_json::Value,
    state_before: serde_json::Value,
) {
    let record = StepRecord {
        index: state.debug_trace.len(),
        node_id: node.id.clone(),
        node_kind: node.spec.kind_name().to_string(),
        node_name: node.name().to_string(),
        action: action.clone(),
        prep_result,
        exec_result,
        state_before,
        state_after: state.snapshot(),
        timestamp: Utc::now(),
    };
    state.debug_trace.push(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::types::{Completion, ToolCall};
    use agentflow_store::MemoryConversationStore;
    use agentflow_test_utils::{fixtures, ScriptedModel, StubToolClient};

    struct Harness {
        executor: StepExecutor,
        model: Arc<ScriptedModel>,
        tools: Arc<StubToolClient>,
        store: Arc<MemoryConversationStore>,
    }

    fn harness(completions: Vec<Completion>, config: AppConfig) -> Harness {
        let model = Arc::new(ScriptedModel::new(completions));
        let tools = Arc::new(
            StubToolClient::new()
                .with_tool("search", "lookup", "Look things up")
                .with_response("search", "lookup", "42"),
        );
        let store = Arc::new(MemoryConversationStore::new());
        let executor = StepExecutor::new(
            model.clone(),
            tools.clone(),
            store.clone(),
            Arc::new(config),
            Arc::new(EventBus::default()),
        );
        for flow in [
            fixtures::simple_flow(),
            fixtures::tool_flow(true),
            fixtures::branching_flow(),
        ] {
            let flow: FlowGraph = serde_json::from_value(flow).unwrap();
            executor.register_flow(&flow).unwrap();
        }
        Harness {
            executor,
            model,
            tools,
            store,
        }
    }

    #[tokio::test]
    async fn simple_flow_answers_and_completes() {
        let h = harness(vec![Completion::text("hello")], AppConfig::default());
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();

        let outcome = h.executor.run("c1", 10).await.unwrap();
        assert_eq!(outcome.action, Action::Default);
        assert_eq!(outcome.state.status, ExecutionStatus::Completed);
        assert_eq!(outcome.state.last_response.as_deref(), Some("hello"));
        assert_eq!(outcome.state.step_count, 3);

        let stored = h.store.get("c1").await.unwrap().unwrap();
        let texts: Vec<&str> = stored.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert_eq!(stored.current_node_id.as_deref(), Some("finish"));
    }

    #[tokio::test]
    async fn each_step_persists_progress() {
        let h = harness(vec![Completion::text("hello")], AppConfig::default());
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();

        let first = h.executor.step("c1").await.unwrap();
        assert_eq!(first.next_node_id.as_deref(), Some("agent"));
        let stored = h.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.current_node_id.as_deref(), Some("start"));
        assert_eq!(stored.start_prompt.as_deref(), Some("You are a helpful assistant."));

        let second = h.executor.step("c1").await.unwrap();
        assert_eq!(second.action, Action::FinalResponse);
        assert_eq!(second.next_node_id.as_deref(), Some("finish"));
        assert_eq!(h.model.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_id_is_not_persisted() {
        let h = harness(vec![], AppConfig::default());
        let outcome = h
            .executor
            .execute_step(ConversationState::new("", "simple"))
            .await;
        assert_eq!(outcome.action, Action::Error);
        assert_eq!(
            outcome.state.last_error.unwrap().code,
            "missing_conversation_id"
        );
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_flow_persists_error_state() {
        let h = harness(vec![], AppConfig::default());
        let outcome = h
            .executor
            .execute_step(ConversationState::new("c1", "ghost"))
            .await;
        assert_eq!(outcome.action, Action::Error);

        let stored = h.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Error);
        assert_eq!(stored.last_error.unwrap().code, "flow_not_found");
    }

    #[tokio::test]
    async fn node_faults_become_error_actions() {
        let h = harness(vec![], AppConfig::default());
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();
        h.executor.step("c1").await.unwrap();

        // Script is empty: the model call fails.
        let outcome = h.executor.step("c1").await.unwrap();
        assert_eq!(outcome.action, Action::Error);
        assert_eq!(outcome.next_node_id, None);
        let stored = h.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Error);
        assert_eq!(
            stored.last_error.unwrap().kind,
            agentflow_core::error::ErrorKind::Model
        );
    }

    #[tokio::test]
    async fn awaiting_and_completed_states_do_not_run() {
        let h = harness(vec![], AppConfig::default());

        let mut awaiting = ConversationState::new("a", "simple");
        awaiting.next_node_id = Some("agent".into());
        awaiting.await_approval(vec![ToolCall::new(
            "t1",
            "_-_-_search_-_-_lookup",
            serde_json::json!({}),
        )]);
        let outcome = h.executor.execute_step(awaiting).await;
        assert_eq!(outcome.action, Action::ToolCall);
        assert_eq!(outcome.next_node_id.as_deref(), Some("agent"));

        let mut done = ConversationState::new("d", "simple");
        done.status = ExecutionStatus::Completed;
        let outcome = h.executor.execute_step(done).await;
        assert_eq!(outcome.action, Action::Default);

        assert_eq!(h.model.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_resume_node_restarts_from_start() {
        let h = harness(vec![], AppConfig::default());
        let mut state = ConversationState::new("c1", "simple");
        state.next_node_id = Some("deleted-node".into());
        let outcome = h.executor.execute_step(state).await;
        assert_eq!(outcome.state.current_node_id.as_deref(), Some("start"));
    }

    #[tokio::test]
    async fn busy_conversation_is_refused_without_persisting() {
        let h = harness(vec![], AppConfig::default());
        let _held = h.executor.locks().try_acquire("c1").unwrap();

        let outcome = h
            .executor
            .execute_step(ConversationState::new("c1", "simple"))
            .await;
        assert_eq!(outcome.action, Action::Error);
        assert_eq!(outcome.state.last_error.unwrap().code, "conversation_busy");
        assert!(h.store.get("c1").await.unwrap().is_none());

        let err = h.executor.step("c1").await.unwrap_err();
        assert!(matches!(err, FlowError::ConversationBusy(_)));
    }

    #[tokio::test]
    async fn cancelled_conversation_stops_stepping() {
        let h = harness(vec![Completion::text("hello")], AppConfig::default());
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();
        h.executor.step("c1").await.unwrap();
        h.executor.cancel("c1").await.unwrap();

        let outcome = h.executor.step("c1").await.unwrap();
        assert_eq!(outcome.action, Action::Default);
        assert_eq!(h.model.call_count(), 0);
        assert_eq!(outcome.state.messages.len(), 1);
    }

    #[tokio::test]
    async fn cancel_while_busy_is_picked_up() {
        let h = harness(vec![Completion::text("hello")], AppConfig::default());
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();
        {
            let _held = h.executor.locks().try_acquire("c1").unwrap();
            h.executor.cancel("c1").await.unwrap();
        }
        let outcome = h.executor.run("c1", 10).await.unwrap();
        assert!(outcome.state.cancelled);
        assert_eq!(h.model.call_count(), 0);
        assert!(h.store.get("c1").await.unwrap().unwrap().cancelled);
    }

    #[tokio::test]
    async fn tool_flow_pauses_for_approval() {
        let h = harness(
            vec![Completion::with_tool_calls(
                "",
                vec![ToolCall::new(
                    "call_1",
                    "_-_-_search_-_-_lookup",
                    serde_json::json!({"q": "x"}),
                )],
            )],
            AppConfig::default(),
        );
        h.executor
            .start_conversation(Some("c1".into()), "tools", Some("find x"))
            .await
            .unwrap();

        let outcome = h.executor.run("c1", 10).await.unwrap();
        assert_eq!(outcome.action, Action::ToolCall);
        assert_eq!(outcome.next_node_id.as_deref(), Some("agent"));
        assert_eq!(outcome.state.status, ExecutionStatus::AwaitingToolApproval);
        assert_eq!(outcome.state.pending_tool_calls.len(), 1);
        assert_eq!(h.tools.call_count(), 0);
    }

    #[tokio::test]
    async fn branching_flow_follows_handoff() {
        let h = harness(
            vec![
                Completion::with_tool_calls(
                    "",
                    vec![ToolCall::new("h1", "handoff_to_billing", serde_json::json!({}))],
                ),
                Completion::text("Your invoice is attached."),
            ],
            AppConfig::default(),
        );
        h.executor
            .start_conversation(Some("c1".into()), "branching", Some("invoice?"))
            .await
            .unwrap();

        let outcome = h.executor.run("c1", 10).await.unwrap();
        assert_eq!(outcome.state.status, ExecutionStatus::Completed);
        assert_eq!(
            outcome.state.last_response.as_deref(),
            Some("Your invoice is attached.")
        );
        let speakers: Vec<&str> = outcome
            .state
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(|m| m.node_id.as_deref())
            .collect();
        assert_eq!(speakers, vec!["triage", "billing"]);
    }

    #[tokio::test]
    async fn debug_mode_records_and_pauses() {
        let mut config = AppConfig::default();
        config.engine.default_debug_mode = true;
        let h = harness(vec![Completion::text("hello")], config);
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();

        let outcome = h.executor.run("c1", 10).await.unwrap();
        assert_eq!(outcome.state.status, ExecutionStatus::PausedDebug);
        assert_eq!(outcome.state.debug_trace.len(), 1);
        let record = &outcome.state.debug_trace[0];
        assert_eq!(record.node_kind, "start");
        assert!(record.state_after.get("debug_trace").is_none());
        assert_eq!(record.state_before["current_node_id"], serde_json::Value::Null);
        assert_eq!(record.state_after["current_node_id"], "start");
    }

    #[tokio::test]
    async fn follow_up_message_continues_completed_conversation() {
        let h = harness(
            vec![Completion::text("hello"), Completion::text("bye")],
            AppConfig::default(),
        );
        h.executor
            .start_conversation(Some("c1".into()), "simple", Some("hi"))
            .await
            .unwrap();
        h.executor.run("c1", 10).await.unwrap();

        let state = h.executor.post_user_message("c1", "thanks").await.unwrap();
        assert_eq!(state.status, ExecutionStatus::Running);
        assert_eq!(state.next_node_id.as_deref(), Some("agent"));

        let outcome = h.executor.run("c1", 10).await.unwrap();
        assert_eq!(outcome.state.last_response.as_deref(), Some("bye"));
    }

    #[tokio::test]
    async fn duplicate_conversation_ids_are_rejected() {
        let h = harness(vec![], AppConfig::default());
        h.executor
            .start_conversation(Some("c1".into()), "simple", None)
            .await
            .unwrap();
        assert!(h
            .executor
            .start_conversation(Some("c1".into()), "simple", None)
            .await
            .is_err());
        assert!(matches!(
            h.executor.start_conversation(None, "ghost", None).await,
            Err(FlowError::FlowNotFound(_))
        ));
    }
}
