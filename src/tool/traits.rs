// ABOUTME: Defines the Tool trait - the abstraction for in-process builtin tools.
// ABOUTME: Tools have a name, description, schema, danger level, and async execute.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ToolResult;

/// How risky a tool invocation is considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    #[default]
    Safe,
    Caution,
    Dangerous,
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DangerLevel::Safe => write!(f, "safe"),
            DangerLevel::Caution => write!(f, "caution"),
            DangerLevel::Dangerous => write!(f, "dangerous"),
        }
    }
}

/// An in-process tool that can be executed by an agent.
///
/// Builtin tools are registered once at startup and live for the process
/// lifetime; scans and reloads never touch them.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of this tool.
    fn name(&self) -> &str;

    /// Returns a human-readable description for the agent.
    fn description(&self) -> &str;

    /// Returns the JSON Schema for the tool's input parameters.
    fn schema(&self) -> serde_json::Value;

    /// How risky this tool is. Defaults to safe.
    fn danger_level(&self) -> DangerLevel {
        DangerLevel::Safe
    }

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error>;
}
