use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::state::ConversationState;
use agentflow_core::traits::ConversationStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        flow_id TEXT NOT NULL,
        status TEXT NOT NULL,
        state_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversations_flow
        ON conversations(flow_id, updated_at DESC);";

/// SQLite-backed conversation store. One JSON row per conversation.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

impl SqliteConversationStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Conversation store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn db_err(e: rusqlite::Error) -> FlowError {
    FlowError::Database(e.to_string())
}

impl ConversationStore for SqliteConversationStore {
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<ConversationState>>> {
        let id = id.to_string();
        Box::pin(async move {
            let json: Option<String> = {
                let conn = self
                    .conn
                    .lock()
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                conn.query_row(
                    "SELECT state_json FROM conversations WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
            };

            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
    }

    fn put(&self, state: &ConversationState) -> BoxFuture<'_, Result<()>> {
        let row = serde_json::to_string(state).map(|json| {
            (
                state.id.clone(),
                state.flow_id.clone(),
                state.status.to_string(),
                json,
                state.updated_at.to_rfc3339(),
            )
        });

        Box::pin(async move {
            let (id, flow_id, status, json, updated_at) = row?;
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;
            conn.execute(
                "INSERT INTO conversations (id, flow_id, status, state_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     flow_id = excluded.flow_id,
                     status = excluded.status,
                     state_json = excluded.state_json,
                     updated_at = excluded.updated_at",
                params![id, flow_id, status, json, updated_at],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;
            let removed = conn
                .execute("DELETE FROM conversations WHERE id = ?1", params![id])
                .map_err(db_err)?;
            Ok(removed > 0)
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowError::Database(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT id FROM conversations ORDER BY updated_at DESC")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(db_err)?);
            }
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::state::ExecutionStatus;
    use agentflow_core::types::{ChatMessage, ToolCall};

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let mut state = ConversationState::new("c1", "support");
        state.push_message(ChatMessage::user("hi"));
        state.await_approval(vec![ToolCall::new(
            "call_1",
            "_-_-_search_-_-_lookup",
            serde_json::json!({"q": "rust"}),
        )]);
        store.put(&state).await.unwrap();

        let loaded = store.get("c1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.status, ExecutionStatus::AwaitingToolApproval);
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let mut state = ConversationState::new("c1", "support");
        store.put(&state).await.unwrap();

        state.step_count = 3;
        state.status = ExecutionStatus::Completed;
        store.put(&state).await.unwrap();

        let loaded = store.get("c1").await.unwrap().unwrap();
        assert_eq!(loaded.step_count, 3);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteConversationStore::in_memory().unwrap();
        store.put(&ConversationState::new("c1", "f")).await.unwrap();
        assert!(store.delete("c1").await.unwrap());
        assert!(!store.delete("c1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("conversations.db");
        {
            let store = SqliteConversationStore::open(&path).unwrap();
            store.put(&ConversationState::new("c1", "f")).await.unwrap();
        }
        let store = SqliteConversationStore::open(&path).unwrap();
        assert!(store.get("c1").await.unwrap().is_some());
    }
}
