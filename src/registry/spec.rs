// ABOUTME: Tool specification types - source kinds, plugin manifests,
// ABOUTME: skill frontmatter, and the uniform list_all summary record.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tool::DangerLevel;

/// Where a registered tool came from. Resolved once at registration time;
/// dispatch branches on this, never on runtime inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Builtin,
    Plugin,
    Instruction,
    Mcp,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Builtin => write!(f, "builtin"),
            ToolKind::Plugin => write!(f, "plugin"),
            ToolKind::Instruction => write!(f, "instruction"),
            ToolKind::Mcp => write!(f, "mcp"),
        }
    }
}

/// Runtime used to execute a plugin's executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginRuntime {
    Python,
    Node,
}

impl PluginRuntime {
    /// The interpreter command for this runtime.
    pub fn command(&self) -> &'static str {
        match self {
            PluginRuntime::Python => "python3",
            PluginRuntime::Node => "node",
        }
    }
}

/// A registered plugin tool: one-shot subprocess invocation per call.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    pub name: String,
    pub description: String,
    /// Absolute path to the executable, resolved against the manifest's
    /// directory at scan time.
    pub executable: PathBuf,
    pub runtime: PluginRuntime,
    pub inputs: serde_json::Value,
    pub danger_level: DangerLevel,
    pub version: String,
    pub keywords: Vec<String>,
}

/// A registered instruction tool, backed by a skill definition file and
/// executed by delegating to the external skill executor.
#[derive(Debug, Clone)]
pub struct InstructionSpec {
    /// Registry name, derived from the declared skill name.
    pub name: String,
    /// The skill name as declared in the definition file.
    pub skill_name: String,
    pub description: String,
    pub version: String,
    pub path: PathBuf,
}

/// On-disk shape of a plugin manifest (`plugin.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub tools: Vec<ManifestTool>,
}

/// One tool declaration inside a plugin manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestTool {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub executable: String,
    pub runtime: PluginRuntime,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
    #[serde(default, rename = "dangerLevel")]
    pub danger_level: DangerLevel,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The YAML frontmatter of a skill definition, parsed only far enough to
/// register the skill as an instruction tool. Full skill parsing belongs
/// to the skill executor.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillFrontmatter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Uniform summary record returned by `list_all()` for every tool across
/// all four sources. This is the registry's primary read contract.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub description: String,
    pub inputs: serde_json::Value,
    #[serde(rename = "dangerLevel")]
    pub danger_level: DangerLevel,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}
