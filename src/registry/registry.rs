// ABOUTME: Implements ToolRegistry - the single source of truth for what tools
// ABOUTME: exist and how to run them, independent of transport details.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::scan::{self, ScanOutcome};
use super::spec::{InstructionSpec, PluginSpec, ToolKind, ToolSummary};
use crate::error::RegistryError;
use crate::mcp::{DEFAULT_TIMEOUT, McpManager};
use crate::tool::{DangerLevel, Tool, ToolResult};

/// Output larger than this is truncated, not rejected.
pub const MAX_OUTPUT_BYTES: usize = 100_000;

/// Fixed per-call timeout for plugin and instruction subprocesses.
///
/// After the timeout the dispatch returns an error result but the child is
/// not force-killed by the registry; treating the timeout as failure (and
/// any cleanup beyond that) is the caller's responsibility.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// The top-level tool catalog, aggregating builtin, plugin, instruction,
/// and MCP tools.
///
/// Builtin entries are permanent for the process lifetime. Plugin and
/// instruction maps are rebuilt wholesale by [`ToolRegistry::scan_plugins`];
/// the MCP namespace is rebuilt by [`ToolRegistry::scan_mcp_servers`]. The
/// two rebuilds are independent, so a reader can briefly observe one source
/// refreshed and another stale during a reload.
pub struct ToolRegistry {
    project_root: PathBuf,
    skill_dirs: Vec<PathBuf>,
    skill_executor: Option<PathBuf>,
    builtins: RwLock<HashMap<String, Arc<dyn Tool>>>,
    plugins: RwLock<HashMap<String, PluginSpec>>,
    instructions: RwLock<HashMap<String, InstructionSpec>>,
    mcp: Arc<McpManager>,
}

impl ToolRegistry {
    /// Create a registry rooted at the given project directory, with no
    /// skill directories and no MCP servers.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            skill_dirs: Vec::new(),
            skill_executor: None,
            builtins: RwLock::new(HashMap::new()),
            plugins: RwLock::new(HashMap::new()),
            instructions: RwLock::new(HashMap::new()),
            mcp: Arc::new(McpManager::disabled()),
        }
    }

    /// Add a directory to scan for plugin manifests and skill definitions.
    pub fn skill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skill_dirs.push(dir.into());
        self
    }

    /// Set the skill-executor script that instruction tools delegate to.
    pub fn skill_executor(mut self, path: impl Into<PathBuf>) -> Self {
        self.skill_executor = Some(path.into());
        self
    }

    /// Set the MCP manager backing the `mcp` tool source.
    pub fn mcp_manager(mut self, manager: Arc<McpManager>) -> Self {
        self.mcp = manager;
        self
    }

    /// Register an in-process builtin tool. Called once at startup for the
    /// fixed set of builtins; never touched by reload or scan.
    pub async fn register_builtin<T: Tool + 'static>(&self, tool: T) {
        self.register_builtin_arc(Arc::new(tool)).await;
    }

    /// Register a builtin from an Arc.
    pub async fn register_builtin_arc(&self, tool: Arc<dyn Tool>) {
        let mut builtins = self.builtins.write().await;
        builtins.insert(tool.name().to_string(), tool);
    }

    /// Whether a name resolves to any tool across the four sources.
    pub async fn is_registered(&self, name: &str) -> bool {
        self.instructions.read().await.contains_key(name)
            || self.plugins.read().await.contains_key(name)
            || self.mcp.is_registered(name).await
            || self.builtins.read().await.contains_key(name)
    }

    /// Names claimed outside the MCP namespace; MCP tools colliding with
    /// these register under their qualified names instead.
    pub async fn reserved_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self.builtins.read().await.keys().cloned().collect();
        names.extend(self.plugins.read().await.keys().cloned());
        names.extend(self.instructions.read().await.keys().cloned());
        names
    }

    /// Re-scan the skill directories, replacing the plugin and instruction
    /// maps wholesale. Idempotent over an unchanged filesystem.
    pub async fn scan_plugins(&self) {
        let builtin_names: HashSet<String> =
            self.builtins.read().await.keys().cloned().collect();

        let ScanOutcome {
            plugins,
            instructions,
        } = scan::scan_skill_dirs(&self.skill_dirs, &builtin_names);

        info!(
            plugins = plugins.len(),
            instructions = instructions.len(),
            "skill directory scan complete"
        );

        *self.plugins.write().await = plugins;
        *self.instructions.write().await = instructions;
    }

    /// Rebuild the MCP namespace from the current server config.
    /// Returns the number of servers that connected.
    pub async fn scan_mcp_servers(&self) -> usize {
        let reserved = self.reserved_names().await;
        self.mcp.reload(&reserved).await
    }

    /// Full hot reload: plugin/instruction scan, then MCP re-scan. Each
    /// source's map is cleared-and-rebuilt independently.
    pub async fn reload(&self) -> usize {
        self.scan_plugins().await;
        self.scan_mcp_servers().await
    }

    /// Reconnect one MCP server without touching the others.
    pub async fn reconnect_mcp_server(&self, server: &str) -> Result<(), crate::error::McpError> {
        let reserved = self.reserved_names().await;
        self.mcp.reconnect_server(server, &reserved).await
    }

    /// Disconnect every MCP server; used at process exit.
    pub async fn shutdown(&self) {
        self.mcp.shutdown_all().await;
    }

    /// A uniform summary of every tool across all four sources, sorted by
    /// name. This is the registry's primary read contract.
    pub async fn list_all(&self) -> Vec<ToolSummary> {
        let mut summaries = Vec::new();

        for tool in self.builtins.read().await.values() {
            let schema = tool.schema();
            summaries.push(ToolSummary {
                name: tool.name().to_string(),
                kind: ToolKind::Builtin,
                description: tool.description().to_string(),
                inputs: schema
                    .get("properties")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({})),
                danger_level: tool.danger_level(),
                version: "1.0.0".to_string(),
                server: None,
            });
        }

        for spec in self.plugins.read().await.values() {
            summaries.push(ToolSummary {
                name: spec.name.clone(),
                kind: ToolKind::Plugin,
                description: spec.description.clone(),
                inputs: spec.inputs.clone(),
                danger_level: spec.danger_level,
                version: spec.version.clone(),
                server: None,
            });
        }

        for spec in self.instructions.read().await.values() {
            summaries.push(ToolSummary {
                name: spec.name.clone(),
                kind: ToolKind::Instruction,
                description: spec.description.clone(),
                inputs: serde_json::json!({}),
                danger_level: DangerLevel::Safe,
                version: spec.version.clone(),
                server: None,
            });
        }

        for entry in self.mcp.tool_entries().await {
            summaries.push(ToolSummary {
                name: entry.registered_name.clone(),
                kind: ToolKind::Mcp,
                description: entry.description.clone(),
                inputs: entry
                    .input_schema
                    .get("properties")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({})),
                danger_level: DangerLevel::Safe,
                version: "1.0.0".to_string(),
                server: Some(entry.server.clone()),
            });
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Execute a tool by name. Failures never cross this boundary as
    /// errors; they are rendered into an error `ToolResult` so callers can
    /// present every outcome uniformly.
    ///
    /// Precedence: instruction, plugin, MCP, then the builtin map.
    pub async fn dispatch(&self, name: &str, args: serde_json::Value) -> ToolResult {
        if let Some(spec) = self.instructions.read().await.get(name).cloned() {
            return self.run_instruction(&spec, args).await;
        }

        if let Some(spec) = self.plugins.read().await.get(name).cloned() {
            return run_plugin(&spec, args).await;
        }

        if self.mcp.is_registered(name).await {
            return match self.mcp.call_tool(name, args, DEFAULT_TIMEOUT).await {
                Ok(output) => cap_result(ToolResult::text(output)),
                Err(e) => ToolResult::error(e.to_string()),
            };
        }

        if let Some(tool) = self.builtins.read().await.get(name).cloned() {
            return match tool.execute(args).await {
                Ok(result) => cap_result(result),
                Err(e) => ToolResult::error(format!("{name}: {e}")),
            };
        }

        ToolResult::error(RegistryError::NotFound(name.to_string()).to_string())
    }

    /// Delegate an instruction tool to the external skill executor.
    ///
    /// Contract: `{tool: "run_skill", args: {skill_name, args, project_root}}`
    /// on its stdin; `{success, instructions|error}` JSON on its stdout, or
    /// raw stdout as the result text when it is not valid JSON.
    async fn run_instruction(&self, spec: &InstructionSpec, args: serde_json::Value) -> ToolResult {
        let Some(executor) = &self.skill_executor else {
            return ToolResult::error(format!(
                "Instruction tool '{}' requires a skill executor, but none is configured",
                spec.name
            ));
        };

        let payload = serde_json::json!({
            "tool": "run_skill",
            "args": {
                "skill_name": spec.skill_name,
                "args": args,
                "project_root": self.project_root,
            }
        });

        let mut cmd = Command::new("python3");
        cmd.arg(executor);
        let output = match run_subprocess(cmd, &spec.name, payload).await {
            Ok(output) => output,
            Err(result) => return result,
        };

        match serde_json::from_str::<serde_json::Value>(&output.stdout) {
            Ok(reply) => {
                if reply.get("success").and_then(|v| v.as_bool()).unwrap_or(false) {
                    let instructions = reply
                        .get("instructions")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    cap_result(ToolResult::text(instructions))
                } else {
                    let error = reply
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("skill execution failed");
                    ToolResult::error(error.to_string())
                }
            }
            // Not JSON: the raw stdout is the result text.
            Err(_) => cap_result(ToolResult::text(output.stdout)),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SubprocessOutput {
    pub(crate) stdout: String,
}

/// Execute a plugin tool as a one-shot subprocess: JSON on stdin, raw
/// stdout as the result, non-zero exit treated as failure carrying stderr.
async fn run_plugin(spec: &PluginSpec, args: serde_json::Value) -> ToolResult {
    let payload = serde_json::json!({"tool": spec.name, "args": args});

    let mut cmd = Command::new(spec.runtime.command());
    cmd.arg(&spec.executable);
    if let Some(dir) = spec.executable.parent() {
        cmd.current_dir(dir);
    }

    match run_subprocess(cmd, &spec.name, payload).await {
        Ok(output) => cap_result(ToolResult::text(output.stdout)),
        Err(result) => result,
    }
}

/// Spawn, feed stdin, and collect output under [`DISPATCH_TIMEOUT`].
/// Returns the failure as a ready-to-return error result.
pub(crate) async fn run_subprocess(
    mut cmd: Command,
    tool: &str,
    payload: serde_json::Value,
) -> Result<SubprocessOutput, ToolResult> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(%tool, error = %e, "failed to start tool subprocess");
            return Err(ToolResult::error(format!("{tool}: failed to start: {e}")));
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(payload.to_string().as_bytes()).await {
            return Err(ToolResult::error(format!("{tool}: failed to write input: {e}")));
        }
        // Drop closes the pipe so the child sees EOF.
    }

    let output = match tokio::time::timeout(DISPATCH_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(ToolResult::error(format!("{tool}: {e}"))),
        // The child is left running; the timeout itself is the failure.
        Err(_) => {
            return Err(ToolResult::error(format!(
                "{tool}: timed out after {}s",
                DISPATCH_TIMEOUT.as_secs()
            )));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolResult::error(truncate_output(format!(
            "{tool}: exit code {code}: {}",
            stderr.trim()
        )))
        .with_metadata("exit_code", code));
    }

    Ok(SubprocessOutput { stdout })
}

/// Cap a result's content, recording the truncation in its metadata.
fn cap_result(mut result: ToolResult) -> ToolResult {
    let truncated = result.content.len() > MAX_OUTPUT_BYTES;
    result.content = truncate_output(result.content);
    if truncated {
        result = result.with_metadata("truncated", true);
    }
    result
}

/// Cap oversized output; truncate, never error.
pub(crate) fn truncate_output(mut s: String) -> String {
    if s.len() <= MAX_OUTPUT_BYTES {
        return s;
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str("\n... [output truncated]");
    s
}
