use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::future::BoxFuture;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agentflow_core::config::{AppConfig, McpTransport, StoreBackend};
use agentflow_core::error::ModelError;
use agentflow_core::event::EventBus;
use agentflow_core::traits::{CompletionModel, ConversationStore};
use agentflow_core::types::{ChatMessage, Completion, ToolSpec};

use agentflow_engine::graph::{NodeKind, ToolProviderRef};
use agentflow_engine::tools::prepare_tools;
use agentflow_engine::{
    convert, ApprovalDecision, ApprovalGate, FlowGraph, NodeSpec, StepExecutor, ToolOrchestrator,
};
use agentflow_mcp::McpClientManager;
use agentflow_store::{MemoryConversationStore, SqliteConversationStore};

#[derive(Parser)]
#[command(name = "agentflow", version, about = "Resumable agent flow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "agentflow.toml", env = "AGENTFLOW_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a flow file and print its executable graph
    Validate {
        /// Canvas JSON file
        flow: PathBuf,
    },
    /// Discover the tools a flow's providers expose
    Tools {
        /// Canvas JSON file
        flow: PathBuf,
    },
    /// Inspect stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },
    /// Approve a pending tool call
    Approve {
        conversation: String,
        /// Tool call id (a unique prefix is enough)
        tool_call: String,
    },
    /// Reject a pending tool call
    Reject {
        conversation: String,
        /// Tool call id (a unique prefix is enough)
        tool_call: String,
        /// Reason passed back to the model
        #[arg(long)]
        reason: Option<String>,
    },
    /// Cancel a conversation
    Cancel { conversation: String },
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List stored conversations
    List,
    /// Print a conversation as JSON
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
}

/// Stand-in for the completion capability, which the embedding
/// application provides. Commands run here never reach a model.
struct UnconfiguredModel;

impl CompletionModel for UnconfiguredModel {
    fn complete(
        &self,
        model_id: &str,
        _messages: Vec<ChatMessage>,
        _tools: &[ToolSpec],
    ) -> BoxFuture<'_, Result<Completion, ModelError>> {
        let model_id = model_id.to_string();
        Box::pin(async move { Err(ModelError::ModelNotFound(model_id)) })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agentflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Validate { flow } => validate(&flow)?,
        Commands::Tools { flow } => list_tools(&flow, &config).await?,
        Commands::Conversations { action } => {
            let store = open_store(&config)?;
            handle_conversations(action, store.as_ref()).await?;
        }
        Commands::Approve {
            conversation,
            tool_call,
        } => {
            resolve(&config, &conversation, &tool_call, ApprovalDecision::Approve).await?;
        }
        Commands::Reject {
            conversation,
            tool_call,
            reason,
        } => {
            resolve(
                &config,
                &conversation,
                &tool_call,
                ApprovalDecision::Reject { reason },
            )
            .await?;
        }
        Commands::Cancel { conversation } => {
            let (executor, manager) = build_executor(&config)?;
            executor.cancel(&conversation).await?;
            manager.disconnect_all().await;
            println!("Cancelled {}", conversation);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home) = dirs_home().map(|h| h.join(".agentflow").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }
    warn!(path = %path.display(), "No config file found, using defaults");
    Ok(AppConfig::default())
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let store: Arc<dyn ConversationStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteConversationStore::open(
            &config.store.resolved_path(),
        )?),
        StoreBackend::Memory => {
            warn!("Memory store configured; conversations do not outlive this process");
            Arc::new(MemoryConversationStore::new())
        }
    };
    Ok(store)
}

fn mcp_manager(config: &AppConfig) -> Arc<McpClientManager> {
    let mcp = config.mcp.clone().unwrap_or_default();
    Arc::new(McpClientManager::new(&mcp))
}

fn build_executor(
    config: &AppConfig,
) -> anyhow::Result<(Arc<StepExecutor>, Arc<McpClientManager>)> {
    let manager = mcp_manager(config);
    let executor = StepExecutor::new(
        Arc::new(UnconfiguredModel),
        manager.clone(),
        open_store(config)?,
        Arc::new(config.clone()),
        Arc::new(EventBus::default()),
    );
    Ok((Arc::new(executor), manager))
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let flow = FlowGraph::load(path)?;
    let graph = convert(&flow)?;

    println!("Flow {} ({} nodes)", graph.flow_id, graph.nodes().len());
    println!("  start: {}", graph.start().id);
    for node in graph.nodes() {
        println!("  {} [{}] {}", node.id, node.spec.kind_name(), node.name());
        for succ in &node.successors {
            println!("    --{}--> {}", succ.label, succ.target);
        }
        if let NodeSpec::Process(props) = &node.spec {
            if let Some(model) = &props.bound_model {
                println!("    model: {}", model);
            }
            for r in &props.tool_provider_refs {
                println!("    tools: {} (via {})", r.bound_provider, r.id);
            }
        }
    }

    let unreachable: Vec<&str> = graph
        .nodes()
        .iter()
        .filter(|n| n.spec.kind() != NodeKind::ToolProvider)
        .filter(|n| graph.find_reachable(&n.id).is_none())
        .map(|n| n.id.as_str())
        .collect();
    if !unreachable.is_empty() {
        println!("  unreachable from start: {}", unreachable.join(", "));
    }
    Ok(())
}

async fn list_tools(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
    let flow = FlowGraph::load(path)?;
    let graph = convert(&flow)?;

    let mut seen = HashSet::new();
    let refs: Vec<ToolProviderRef> = graph
        .nodes()
        .iter()
        .filter_map(|n| match &n.spec {
            NodeSpec::Process(props) => Some(props.tool_provider_refs.clone()),
            _ => None,
        })
        .flatten()
        .filter(|r| seen.insert((r.bound_provider.clone(), r.enabled_tools.clone())))
        .collect();

    if refs.is_empty() {
        println!("Flow {} binds no tool providers.", graph.flow_id);
        return Ok(());
    }

    if let Some(mcp) = &config.mcp {
        for r in &refs {
            match mcp.servers.get(&r.bound_provider).map(|s| &s.transport) {
                Some(McpTransport::Stdio { command, args, .. }) => {
                    info!(provider = %r.bound_provider, "stdio: {} {}", command, args.join(" "))
                }
                Some(McpTransport::Http { url }) => {
                    info!(provider = %r.bound_provider, "http: {}", url)
                }
                None => warn!(provider = %r.bound_provider, "Provider is not configured"),
            }
        }
    }

    let manager = mcp_manager(config);
    let orchestrator = ToolOrchestrator::new(manager.clone(), Arc::new(EventBus::default()));
    let discovered = orchestrator.discover_tools(&refs).await;
    manager.disconnect_all().await;

    let definitions: Vec<_> = discovered?.into_iter().map(|t| t.definition).collect();
    let specs = prepare_tools(&definitions)?;
    println!("{}", serde_json::to_string_pretty(&specs)?);
    Ok(())
}

async fn handle_conversations(
    action: ConversationAction,
    store: &dyn ConversationStore,
) -> anyhow::Result<()> {
    match action {
        ConversationAction::List => {
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No conversations.");
            }
            for id in ids {
                if let Some(state) = store.get(&id).await? {
                    let pending = if state.pending_tool_calls.is_empty() {
                        String::new()
                    } else {
                        format!(" ({} pending)", state.pending_tool_calls.len())
                    };
                    println!(
                        "  {} flow={} status={} steps={}{}",
                        state.id, state.flow_id, state.status, state.step_count, pending
                    );
                }
            }
        }
        ConversationAction::Show { id } => match store.get(&id).await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => anyhow::bail!("Conversation not found: {}", id),
        },
        ConversationAction::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted {}", id);
            } else {
                anyhow::bail!("Conversation not found: {}", id);
            }
        }
    }
    Ok(())
}

async fn resolve(
    config: &AppConfig,
    conversation: &str,
    prefix: &str,
    decision: ApprovalDecision,
) -> anyhow::Result<()> {
    let (executor, manager) = build_executor(config)?;
    let gate = ApprovalGate::new(executor);

    let call = gate.find_by_prefix(conversation, prefix).await?;
    let approved = decision == ApprovalDecision::Approve;
    let result = gate.resolve(conversation, &call.id, decision).await;
    manager.disconnect_all().await;
    let state = result?;

    let verb = if approved { "Approved" } else { "Rejected" };
    println!("{} {} ({})", verb, call.id, call.name);
    if let Some(msg) = state.messages.last() {
        println!("  -> {}", truncate(&msg.content, 200));
    }
    if state.pending_tool_calls.is_empty() {
        println!("No calls pending; conversation status: {}", state.status);
    } else {
        println!("{} call(s) still pending", state.pending_tool_calls.len());
    }
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
