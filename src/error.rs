// ABOUTME: Defines all error types for the aios-core library using thiserror.
// ABOUTME: Each subsystem has its own error enum, unified under CoreError.

/// Top-level error type for the aios-core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Errors from MCP client and manager operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("Request '{method}' timed out after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Unknown MCP tool: {0}")]
    UnknownTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from tool registry scanning and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Scan error in {path}: {message}")]
    Scan { path: String, message: String },

    #[error("Tool name conflict: '{0}' is already registered")]
    Conflict(String),

    #[error("Unknown tool: {0}")]
    NotFound(String),
}

/// Errors from subagent scheduling.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Subagent pool is at capacity ({0} running); retry once a slot frees")]
    Capacity(usize),
}
