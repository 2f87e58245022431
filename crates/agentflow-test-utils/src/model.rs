use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use agentflow_core::error::ModelError;
use agentflow_core::traits::CompletionModel;
use agentflow_core::types::{ChatMessage, Completion, ToolSpec};

/// One call the model received.
#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Completion model that replays a fixed script, one entry per call.
/// Calls past the end of the script fail.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<Completion, ModelError>>>,
    calls: Mutex<Vec<RecordedCompletion>>,
}

impl ScriptedModel {
    pub fn new(completions: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(completions.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append a failing turn.
    pub fn then_error(self, error: ModelError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCompletion> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl CompletionModel for ScriptedModel {
    fn complete(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        tools: &[ToolSpec],
    ) -> BoxFuture<'_, Result<Completion, ModelError>> {
        self.calls.lock().unwrap().push(RecordedCompletion {
            model_id: model_id.to_string(),
            messages,
            tools: tools.to_vec(),
        });
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| Err(ModelError::Unknown("script exhausted".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_then_fails() {
        let model = ScriptedModel::new(vec![Completion::text("one")])
            .then_error(ModelError::ModelNotFound("m".into()));

        let first = model.complete("m", vec![ChatMessage::user("hi")], &[]).await;
        assert_eq!(first.unwrap().content, "one");
        assert!(matches!(
            model.complete("m", vec![], &[]).await,
            Err(ModelError::ModelNotFound(_))
        ));
        assert!(model.complete("m", vec![], &[]).await.is_err());

        assert_eq!(model.call_count(), 3);
        assert_eq!(model.calls()[0].messages[0].content, "hi");
    }
}
