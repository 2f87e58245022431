use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use rmcp::handler::client::ClientHandler;
use rmcp::model::*;
use rmcp::service::NotificationContext;
use rmcp::RoleClient;

/// Per-server count of `tools/list_changed` notifications.
///
/// Conversations record the revision their cached tool list was taken at
/// and rediscover once it moves.
#[derive(Debug, Default)]
pub struct ToolRevisions {
    counts: Mutex<HashMap<String, u64>>,
}

impl ToolRevisions {
    pub fn get(&self, server: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(server)
            .copied()
            .unwrap_or(0)
    }

    pub fn bump(&self, server: &str) -> u64 {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(server.to_string()).or_default();
        *count += 1;
        *count
    }
}

/// Client-side handler for one provider connection.
pub struct AgentflowClientHandler {
    server_name: String,
    revisions: Arc<ToolRevisions>,
}

impl AgentflowClientHandler {
    pub fn new(server_name: &str, revisions: Arc<ToolRevisions>) -> Self {
        Self {
            server_name: server_name.to_string(),
            revisions,
        }
    }

    fn tools_changed(&self) {
        let revision = self.revisions.bump(&self.server_name);
        info!(server = %self.server_name, revision, "MCP tool list changed");
    }
}

#[allow(clippy::manual_async_fn)]
impl ClientHandler for AgentflowClientHandler {
    fn on_tool_list_changed(
        &self,
        _ctx: NotificationContext<RoleClient>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async { self.tools_changed() }
    }

    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _ctx: NotificationContext<RoleClient>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let server = &self.server_name;
            let message = params.data.to_string();
            match params.level {
                LoggingLevel::Debug => debug!(server = %server, "{}", message),
                LoggingLevel::Info | LoggingLevel::Notice => {
                    info!(server = %server, "{}", message)
                }
                LoggingLevel::Warning => warn!(server = %server, "{}", message),
                _ => error!(server = %server, "{}", message),
            }
        }
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "agentflow".into(),
                title: None,
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: None,
            },
        }
    }
}
