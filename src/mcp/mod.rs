// ABOUTME: MCP module - Model Context Protocol client implementation.
// ABOUTME: Stdio transport, per-server client, and the multi-server manager.

mod client;
mod manager;
mod transport;
mod types;

pub use client::McpClient;
pub use manager::{McpManager, McpToolEntry, ServerStatus};
pub use transport::StdioTransport;
pub use types::*;
