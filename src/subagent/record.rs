// ABOUTME: Subagent execution records - status machine and per-agent state.
// ABOUTME: Records are mutated only by their owning worker after submission.

use std::time::SystemTime;

use serde::Serialize;

/// State of one subagent execution unit.
///
/// `Pending -> Running -> {Completed | Failed}`, or `Pending -> Queued`
/// (terminal, rejected) when the pool is already at capacity at spawn
/// time: spawn never blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
}

impl AgentStatus {
    /// Whether this status is final for its record.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Queued | AgentStatus::Completed | AgentStatus::Failed
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Pending => write!(f, "pending"),
            AgentStatus::Queued => write!(f, "queued"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Completed => write!(f, "completed"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One subagent execution unit as seen by status and collect calls.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub id: String,
    pub agent_type: String,
    pub task: String,
    pub tools: Vec<String>,
    pub context: String,
    pub status: AgentStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

impl AgentRecord {
    pub(crate) fn new(
        id: String,
        agent_type: String,
        task: String,
        tools: Vec<String>,
        context: String,
    ) -> Self {
        Self {
            id,
            agent_type,
            task,
            tools,
            context,
            status: AgentStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}
