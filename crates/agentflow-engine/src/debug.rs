use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::state::{ConversationState, StepRecord};

use crate::executor::StepExecutor;

/// Navigates the step records of conversations running in debug mode.
///
/// The cursor is per conversation and defaults to the latest record.
/// Moving it never re-executes anything except when stepping forward past
/// the last record, which runs exactly one real step.
pub struct DebugTracer {
    executor: Arc<StepExecutor>,
    cursors: Mutex<HashMap<String, usize>>,
}

impl DebugTracer {
    pub fn new(executor: Arc<StepExecutor>) -> Self {
        Self {
            executor,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub async fn enable(&self, id: &str) -> Result<ConversationState> {
        self.executor.set_debug_mode(id, true).await
    }

    /// Leave debug mode and release the pause. Recorded steps are kept.
    pub async fn resume(&self, id: &str) -> Result<ConversationState> {
        self.cursors.lock().await.remove(id);
        self.executor.set_debug_mode(id, false).await
    }

    pub async fn current(&self, id: &str) -> Result<Option<StepRecord>> {
        let trace = self.trace(id).await?;
        let cursor = self.cursor(id, &trace).await;
        Ok(cursor.and_then(|i| trace.get(i).cloned()))
    }

    pub async fn step_back(&self, id: &str) -> Result<Option<StepRecord>> {
        let trace = self.trace(id).await?;
        let Some(cursor) = self.cursor(id, &trace).await else {
            return Ok(None);
        };
        let target = cursor.saturating_sub(1);
        self.cursors.lock().await.insert(id.to_string(), target);
        Ok(trace.get(target).cloned())
    }

    pub async fn step_forward(&self, id: &str) -> Result<Option<StepRecord>> {
        let trace = self.trace(id).await?;
        if let Some(cursor) = self.cursor(id, &trace).await {
            if cursor + 1 < trace.len() {
                self.cursors.lock().await.insert(id.to_string(), cursor + 1);
                return Ok(trace.get(cursor + 1).cloned());
            }
        }

        let recorded = trace.len();
        let outcome = self.executor.step(id).await?;
        self.cursors.lock().await.remove(id);

        // Nothing new when the step did not run (completed, awaiting approval)
        // or debug mode was off.
        let trace = outcome.state.debug_trace;
        if trace.len() <= recorded {
            return Ok(None);
        }
        debug!(
            conversation_id = %id,
            index = trace.len() - 1,
            action = %outcome.action,
            "Recorded new step"
        );
        Ok(trace.last().cloned())
    }

    async fn trace(&self, id: &str) -> Result<Vec<StepRecord>> {
        self.executor
            .store()
            .get(id)
            .await?
            .map(|s| s.debug_trace)
            .ok_or_else(|| FlowError::ConversationNotFound(id.to_string()))
    }

    async fn cursor(&self, id: &str, trace: &[StepRecord]) -> Option<usize> {
        if trace.is_empty() {
            return None;
        }
        let stored = self.cursors.lock().await.get(id).copied();
        Some(stored.unwrap_or(trace.len() - 1).min(trace.len() - 1))
    }
}
