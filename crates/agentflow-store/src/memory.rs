use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use agentflow_core::error::Result;
use agentflow_core::state::ConversationState;
use agentflow_core::traits::ConversationStore;

/// In-process conversation store. States are cloned in and out, so callers
/// never share a live reference with the map.
#[derive(Default)]
pub struct MemoryConversationStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<ConversationState>>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.states.read().await.get(&id).cloned()) })
    }

    fn put(&self, state: &ConversationState) -> BoxFuture<'_, Result<()>> {
        let state = state.clone();
        Box::pin(async move {
            self.states.write().await.insert(state.id.clone(), state);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.states.write().await.remove(&id).is_some()) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let mut ids: Vec<String> = self.states.read().await.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        })
    }
}
