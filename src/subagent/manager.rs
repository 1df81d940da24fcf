// ABOUTME: Bounded-concurrency subagent scheduler.
// ABOUTME: Spawns short tool-driven explorations and collects their results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};
use uuid::Uuid;

use super::args;
use super::record::{AgentRecord, AgentStatus};
use crate::error::AgentError;
use crate::registry::ToolRegistry;

/// Maximum number of simultaneously running subagents.
pub const MAX_CONCURRENT: usize = 5;

/// Per-tool output fragment cap in an agent's result buffer.
const FRAGMENT_LIMIT: usize = 2000;

/// Runs several short, tool-driven exploration tasks concurrently, bounded
/// by [`MAX_CONCURRENT`].
///
/// Spawn never blocks: when the pool is saturated the new request is
/// immediately marked `Queued` with an explanatory error instead of
/// waiting for capacity. This is admission control, not a work queue.
pub struct SubagentManager {
    registry: Arc<ToolRegistry>,
    agents: Arc<Mutex<HashMap<String, AgentRecord>>>,
    done: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl SubagentManager {
    /// Create a manager executing tools through the given registry.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            agents: Arc::new(Mutex::new(HashMap::new())),
            done: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a subagent and return its id immediately.
    ///
    /// At capacity the record is marked `Queued` (terminal) and no work is
    /// submitted; below capacity the record goes straight to `Running` and
    /// a worker task is started.
    pub async fn spawn(
        &self,
        agent_type: impl Into<String>,
        task: impl Into<String>,
        tools: Vec<String>,
        context: impl Into<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let mut record = AgentRecord::new(
            id.clone(),
            agent_type.into(),
            task.into(),
            tools,
            context.into(),
        );

        let mut agents = self.agents.lock().await;
        let running = agents
            .values()
            .filter(|r| r.status == AgentStatus::Running)
            .count();

        if running >= MAX_CONCURRENT {
            record.status = AgentStatus::Queued;
            record.error = Some(AgentError::Capacity(MAX_CONCURRENT).to_string());
            debug!(agent = %id, "spawn rejected at capacity");
            agents.insert(id.clone(), record);
            return id;
        }

        record.status = AgentStatus::Running;
        record.started_at = Some(SystemTime::now());
        let task_text = record.task.clone();
        let tool_names = record.tools.clone();
        let context = record.context.clone();
        agents.insert(id.clone(), record);
        drop(agents);

        let notify = Arc::new(Notify::new());
        self.done.lock().await.insert(id.clone(), notify.clone());

        let registry = self.registry.clone();
        let agents = self.agents.clone();
        let worker_id = id.clone();
        tokio::spawn(async move {
            // The worker boundary: whatever happens inside becomes a
            // completed or failed record, never a crashed pool.
            let outcome = run_agent(&registry, &task_text, &tool_names, &context).await;

            let mut agents = agents.lock().await;
            if let Some(record) = agents.get_mut(&worker_id) {
                record.completed_at = Some(SystemTime::now());
                match outcome {
                    Ok(output) => {
                        record.status = AgentStatus::Completed;
                        record.result = Some(output);
                    }
                    Err(error) => {
                        record.status = AgentStatus::Failed;
                        record.error = Some(error);
                    }
                }
            }
            drop(agents);

            notify.notify_waiters();
            notify.notify_one();
        });

        info!(agent = %id, "subagent spawned");
        id
    }

    /// Snapshot one agent's record.
    pub async fn get_status(&self, id: &str) -> Option<AgentRecord> {
        self.agents.lock().await.get(id).cloned()
    }

    /// Snapshot every agent record.
    pub async fn get_all_status(&self) -> Vec<AgentRecord> {
        let mut records: Vec<_> = self.agents.lock().await.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Wait for the requested agents up to one shared deadline, then
    /// snapshot each. Agents that never finished are returned with
    /// whatever status they held at the deadline (commonly `Running`).
    pub async fn collect_results(&self, ids: &[String], timeout: Duration) -> Vec<AgentRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut results = Vec::new();

        for id in ids {
            let notify = self.done.lock().await.get(id).cloned();

            if let Some(notify) = notify {
                loop {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    match self.agents.lock().await.get(id) {
                        Some(record) if !record.status.is_terminal() => {}
                        _ => break,
                    }

                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        break;
                    }
                }
            }

            if let Some(record) = self.agents.lock().await.get(id) {
                results.push(record.clone());
            }
        }

        results
    }

    /// Sweep terminal records older than `max_age`. Never removes
    /// `Pending`, `Running`, or `Queued` records. Returns the number
    /// removed.
    pub async fn cleanup_old_agents(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut agents = self.agents.lock().await;
        let before = agents.len();

        agents.retain(|_, record| {
            let reapable = matches!(
                record.status,
                AgentStatus::Completed | AgentStatus::Failed
            );
            if !reapable {
                return true;
            }
            match record.completed_at {
                Some(done) => now
                    .duration_since(done)
                    .map(|age| age < max_age)
                    .unwrap_or(true),
                None => true,
            }
        });

        let removed = before - agents.len();
        let survivors: std::collections::HashSet<String> = agents.keys().cloned().collect();
        drop(agents);

        self.done.lock().await.retain(|id, _| survivors.contains(id));

        if removed > 0 {
            debug!(removed, "cleaned up old subagent records");
        }
        removed
    }
}

/// Worker body: run every assigned tool in order and join the tagged,
/// truncated fragments into one result buffer.
async fn run_agent(
    registry: &ToolRegistry,
    task: &str,
    tools: &[String],
    context: &str,
) -> Result<String, String> {
    if tools.is_empty() {
        return Err("no tools assigned".to_string());
    }

    let mut fragments = Vec::new();
    for tool in tools {
        let tool_args = args::build_args(tool, task, context);
        let result = registry.dispatch(tool, tool_args).await;

        let tag = if result.is_error {
            format!("[{tool}: error]")
        } else {
            format!("[{tool}]")
        };
        fragments.push(format!("{tag}\n{}", truncate_fragment(&result.content)));
    }

    Ok(fragments.join("\n\n"))
}

fn truncate_fragment(s: &str) -> &str {
    if s.len() <= FRAGMENT_LIMIT {
        return s;
    }
    let mut cut = FRAGMENT_LIMIT;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}
