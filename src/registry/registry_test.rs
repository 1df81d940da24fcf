// ABOUTME: Tests for ToolRegistry - registration, scanning, list_all, dispatch.
// ABOUTME: Uses tempdir skill trees and a mock builtin tool.

use std::collections::HashSet;
use std::path::Path;

use super::registry::truncate_output;
use super::*;
use crate::tool::{Tool, ToolResult};

/// Emits more output than the registry's cap allows.
struct FloodTool;

#[async_trait::async_trait]
impl Tool for FloodTool {
    fn name(&self) -> &str {
        "flood"
    }

    fn description(&self) -> &str {
        "Produces oversized output"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolResult, anyhow::Error> {
        Ok(ToolResult::text("x".repeat(MAX_OUTPUT_BYTES + 100)))
    }
}

/// A simple builtin for testing.
struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes input back"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error> {
        let message = params["message"].as_str().unwrap_or("");
        Ok(ToolResult::text(message))
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn plugin_manifest(name: &str) -> String {
    serde_json::json!({
        "tools": [{
            "toolName": name,
            "executable": "execute.py",
            "runtime": "python",
            "description": "scanned tool"
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_builtin_appears_once_in_list_all() {
    let registry = ToolRegistry::new("/tmp");
    registry.register_builtin(EchoTool).await;

    let all = registry.list_all().await;
    let echoes: Vec<_> = all.iter().filter(|s| s.name == "echo").collect();
    assert_eq!(echoes.len(), 1);
    assert_eq!(echoes[0].kind, ToolKind::Builtin);
    assert!(echoes[0].inputs["message"].is_object());
    assert!(echoes[0].server.is_none());
}

#[tokio::test]
async fn test_dispatch_builtin() {
    let registry = ToolRegistry::new("/tmp");
    registry.register_builtin(EchoTool).await;

    let result = registry
        .dispatch("echo", serde_json::json!({"message": "hi"}))
        .await;
    assert!(!result.is_error);
    assert_eq!(result.content, "hi");
}

#[tokio::test]
async fn test_dispatch_unknown_tool_is_error_result() {
    let registry = ToolRegistry::new("/tmp");
    let result = registry.dispatch("ghost", serde_json::json!({})).await;
    assert!(result.is_error);
    assert!(result.content.contains("Unknown tool"));
}

#[tokio::test]
async fn test_scan_registers_plugins_and_instructions() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("weather");
    write(&dir.join("plugin.json"), &plugin_manifest("weather_query"));
    write(&dir.join("execute.py"), "print('ok')");
    write(
        &root.path().join("notes/SKILL.md"),
        "---\nname: Take Notes\ndescription: note taking\n---\nbody\n",
    );

    let registry = ToolRegistry::new(root.path()).skill_dir(root.path());
    registry.scan_plugins().await;

    assert!(registry.is_registered("weather_query").await);
    assert!(registry.is_registered("take_notes").await);

    let all = registry.list_all().await;
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|s| s.kind == ToolKind::Plugin));
    assert!(all.iter().any(|s| s.kind == ToolKind::Instruction));
}

#[tokio::test]
async fn test_builtin_never_shadowed_by_scan() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("clash");
    write(&dir.join("plugin.json"), &plugin_manifest("echo"));
    write(&dir.join("execute.py"), "print('stolen')");

    let registry = ToolRegistry::new(root.path()).skill_dir(root.path());
    registry.register_builtin(EchoTool).await;
    registry.scan_plugins().await;

    let all = registry.list_all().await;
    let echoes: Vec<_> = all.iter().filter(|s| s.name == "echo").collect();
    assert_eq!(echoes.len(), 1);
    assert_eq!(echoes[0].kind, ToolKind::Builtin);

    // Dispatch still reaches the builtin.
    let result = registry
        .dispatch("echo", serde_json::json!({"message": "mine"}))
        .await;
    assert_eq!(result.content, "mine");
}

#[tokio::test]
async fn test_rescan_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("weather");
    write(&dir.join("plugin.json"), &plugin_manifest("weather_query"));
    write(&dir.join("execute.py"), "print('ok')");

    let registry = ToolRegistry::new(root.path()).skill_dir(root.path());
    registry.scan_plugins().await;
    let first: Vec<String> = registry.list_all().await.into_iter().map(|s| s.name).collect();

    registry.scan_plugins().await;
    let second: Vec<String> = registry.list_all().await.into_iter().map(|s| s.name).collect();

    assert_eq!(first, second);
    assert_eq!(first, vec!["weather_query"]);
}

#[tokio::test]
async fn test_rescan_drops_removed_tools() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("gone");
    write(&dir.join("plugin.json"), &plugin_manifest("soon_gone"));
    write(&dir.join("execute.py"), "print('ok')");

    let registry = ToolRegistry::new(root.path()).skill_dir(root.path());
    registry.scan_plugins().await;
    assert!(registry.is_registered("soon_gone").await);

    std::fs::remove_file(dir.join("plugin.json")).unwrap();
    registry.scan_plugins().await;
    assert!(!registry.is_registered("soon_gone").await);
}

#[tokio::test]
async fn test_reserved_names_cover_all_non_mcp_sources() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("weather");
    write(&dir.join("plugin.json"), &plugin_manifest("weather_query"));
    write(&dir.join("execute.py"), "print('ok')");
    write(&root.path().join("notes/SKILL.md"), "---\nname: take-notes\n---\nbody\n");

    let registry = ToolRegistry::new(root.path()).skill_dir(root.path());
    registry.register_builtin(EchoTool).await;
    registry.scan_plugins().await;

    let reserved = registry.reserved_names().await;
    let expected: HashSet<String> = ["echo", "weather_query", "take_notes"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(reserved, expected);
}

#[tokio::test]
async fn test_instruction_without_executor_is_error_result() {
    let root = tempfile::tempdir().unwrap();
    write(&root.path().join("notes/SKILL.md"), "---\nname: take-notes\n---\nbody\n");

    let registry = ToolRegistry::new(root.path()).skill_dir(root.path());
    registry.scan_plugins().await;

    let result = registry.dispatch("take_notes", serde_json::json!({})).await;
    assert!(result.is_error);
    assert!(result.content.contains("skill executor"));
}

#[tokio::test]
async fn test_dispatch_flags_truncated_output_in_metadata() {
    let registry = ToolRegistry::new("/tmp");
    registry.register_builtin(FloodTool).await;
    registry.register_builtin(EchoTool).await;

    let result = registry.dispatch("flood", serde_json::json!({})).await;
    assert!(!result.is_error);
    assert!(result.content.ends_with("[output truncated]"));
    assert_eq!(result.metadata["truncated"], true);

    // Output under the cap carries no truncation marker.
    let result = registry
        .dispatch("echo", serde_json::json!({"message": "small"}))
        .await;
    assert!(!result.metadata.contains_key("truncated"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_subprocess_failure_carries_exit_code() {
    use super::registry::run_subprocess;
    use tokio::process::Command;

    let mut cmd = Command::new("sh");
    cmd.args(["-c", "cat >/dev/null; exit 3"]);

    let result = run_subprocess(cmd, "probe", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(result.is_error);
    assert!(result.content.contains("exit code 3"));
    assert_eq!(result.metadata["exit_code"], 3);
}

#[test]
fn test_truncate_output_caps_size() {
    let big = "x".repeat(MAX_OUTPUT_BYTES + 500);
    let truncated = truncate_output(big);
    assert!(truncated.len() <= MAX_OUTPUT_BYTES + 32);
    assert!(truncated.ends_with("[output truncated]"));

    let small = truncate_output("fine".to_string());
    assert_eq!(small, "fine");
}
