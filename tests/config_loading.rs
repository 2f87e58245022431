use std::io::Write;

use agentflow_core::config::{AppConfig, McpTransport, StoreBackend};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_tool_iterations = 8
default_debug_mode = true

[approval]
require_approval = true
rejection_message = "Denied."

[store]
backend = "sqlite"
path = "/tmp/agentflow-test/conversations.db"

[models.gpt-4o]
system_prompt = "You are precise."

[mcp.servers.search]
timeout_secs = 30

[mcp.servers.search.transport]
type = "stdio"
command = "npx"
args = ["-y", "search-mcp"]
env = { SEARCH_REGION = "eu" }

[mcp.servers.docs.transport]
type = "http"
url = "http://localhost:8931/mcp"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_tool_iterations, 8);
    assert!(config.engine.default_debug_mode);
    assert!(config.approval.require_approval);
    assert_eq!(config.approval.rejection_message, "Denied.");
    assert_eq!(config.store.backend, StoreBackend::Sqlite);
    assert_eq!(
        config.store.resolved_path().to_str(),
        Some("/tmp/agentflow-test/conversations.db")
    );
    assert_eq!(config.model_prompt("gpt-4o"), Some("You are precise."));
    assert_eq!(config.model_prompt("other"), None);

    let mcp = config.mcp.expect("mcp section");
    let search = &mcp.servers["search"];
    assert_eq!(search.timeout_secs, 30);
    match &search.transport {
        McpTransport::Stdio { command, args, env } => {
            assert_eq!(command, "npx");
            assert_eq!(args, &vec!["-y".to_string(), "search-mcp".to_string()]);
            assert_eq!(env["SEARCH_REGION"], "eu");
        }
        other => panic!("expected stdio transport, got {:?}", other),
    }
    assert_eq!(mcp.servers["docs"].timeout_secs, 120);
    assert!(matches!(
        &mcp.servers["docs"].transport,
        McpTransport::Http { url } if url == "http://localhost:8931/mcp"
    ));
}

#[test]
fn test_empty_file_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");
    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_tool_iterations, 25);
    assert!(!config.engine.default_debug_mode);
    assert!(!config.approval.require_approval);
    assert_eq!(
        config.approval.rejection_message,
        "Tool call was rejected by the user."
    );
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert!(config.mcp.is_none());
}

#[test]
fn test_env_vars_expand_in_values() {
    std::env::set_var("AGENTFLOW_TEST_DB_PATH", "/tmp/agentflow-env/db.sqlite");
    let toml_content = r#"
[store]
backend = "sqlite"
path = "${AGENTFLOW_TEST_DB_PATH}"
"#;
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.store.path, "/tmp/agentflow-env/db.sqlite");
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert_eq!(err.code(), "config_error");
}

#[test]
fn test_invalid_toml_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[store]\nbackend = \"postgres\"\n").expect("write toml");
    assert!(AppConfig::load(tmp.path()).is_err());
}
