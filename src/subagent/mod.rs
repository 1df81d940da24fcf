// ABOUTME: Subagent subsystem - record types, heuristic argument building,
// ABOUTME: and the bounded-concurrency manager that runs explorations.

mod args;
mod manager;
mod record;

pub use manager::{MAX_CONCURRENT, SubagentManager};
pub use record::{AgentRecord, AgentStatus};
