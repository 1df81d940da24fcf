// ABOUTME: MCP client - one instance per configured server.
// ABOUTME: Owns a stdio transport, performs the handshake, exposes list_tools/call_tool.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::transport::StdioTransport;
use super::{
    CONNECT_TIMEOUT, CallToolResult, ContentBlock, InitializeResult, McpToolInfo,
    PROTOCOL_VERSION, RpcNotification, ServerConfig, ServerInfo, ToolsListResult,
};
use crate::error::McpError;

/// Client for one MCP server session.
///
/// A connected client spawned a subprocess and completed the
/// initialize/initialized handshake. If the process dies, the session is
/// marked disconnected and its tools are removed from the manager's
/// namespace on the next refresh.
pub struct McpClient {
    config: ServerConfig,
    transport: RwLock<Option<Arc<StdioTransport>>>,
    connected: AtomicBool,
    server_info: RwLock<Option<ServerInfo>>,
    tools: Arc<RwLock<Vec<McpToolInfo>>>,
    notif_task: Mutex<Option<JoinHandle<()>>>,
}

impl McpClient {
    /// Create a client for the given server config. Does not connect.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            transport: RwLock::new(None),
            connected: AtomicBool::new(false),
            server_info: RwLock::new(None),
            tools: Arc::new(RwLock::new(Vec::new())),
            notif_task: Mutex::new(None),
        }
    }

    /// The server name from the config.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the session is connected and its process still alive.
    pub fn connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        match self.transport.try_read() {
            Ok(guard) => guard.as_ref().is_some_and(|t| t.is_alive()),
            Err(_) => true,
        }
    }

    /// Server identity negotiated during the handshake, if connected.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// The last tool list fetched from the server.
    pub async fn cached_tools(&self) -> Vec<McpToolInfo> {
        self.tools.read().await.clone()
    }

    /// Spawn the server process and perform the initialize handshake.
    ///
    /// On failure or handshake timeout the process is torn down; a client
    /// that returns an error here has no subprocess left running.
    pub async fn connect(&self) -> Result<(), McpError> {
        if self.connected() {
            return Ok(());
        }

        let env: HashMap<String, String> = self
            .config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect();

        let (transport, notif_rx) =
            StdioTransport::connect(&self.config.command, &self.config.args, &env).await?;
        let transport = Arc::new(transport);

        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "roots": { "listChanged": true }
            },
            "clientInfo": {
                "name": "aios-core",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let init: InitializeResult =
            match request(&transport, "initialize", Some(params), CONNECT_TIMEOUT).await {
                Ok(value) => match serde_json::from_value(value) {
                    Ok(init) => init,
                    Err(e) => {
                        let _ = transport.shutdown().await;
                        return Err(McpError::Protocol(format!("bad initialize result: {e}")));
                    }
                },
                Err(e) => {
                    let _ = transport.shutdown().await;
                    return Err(e);
                }
            };

        if let Err(e) = transport
            .notify(RpcNotification::new(
                "notifications/initialized",
                Some(serde_json::json!({})),
            ))
            .await
        {
            let _ = transport.shutdown().await;
            return Err(e);
        }

        info!(
            server = %self.config.name,
            remote = init.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
            "connected to MCP server"
        );

        *self.server_info.write().await = init.server_info;
        *self.transport.write().await = Some(transport.clone());
        self.connected.store(true, Ordering::SeqCst);

        let task = tokio::spawn(handle_notifications(
            self.config.name.clone(),
            transport,
            self.tools.clone(),
            notif_rx,
        ));
        *self.notif_task.lock().await = Some(task);

        Ok(())
    }

    /// Fetch the server's tool list, replacing the cached list entirely.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let transport = self.transport_handle().await?;
        let tools = fetch_tools(&transport).await?;
        *self.tools.write().await = tools.clone();
        Ok(tools)
    }

    /// Call a tool and normalize its result into one string.
    ///
    /// A result with `isError: true` becomes `McpError::ToolExecution`
    /// carrying the concatenated text parts. A success flattens every
    /// content part (text verbatim, image/resource as placeholders) into
    /// one newline-joined string.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, McpError> {
        let transport = self.transport_handle().await?;
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let value = request(&transport, "tools/call", Some(params), timeout).await?;
        let result: CallToolResult = serde_json::from_value(value)?;

        if result.is_error {
            let text: String = result
                .content
                .iter()
                .filter_map(|c| match c {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            return Err(McpError::ToolExecution(text));
        }

        Ok(flatten_content(&result.content))
    }

    /// Terminate the process and mark the session disconnected. Idempotent.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(task) = self.notif_task.lock().await.take() {
            task.abort();
        }

        if let Some(transport) = self.transport.write().await.take() {
            let _ = transport.shutdown().await;
        }

        self.tools.write().await.clear();
        debug!(server = %self.config.name, "disconnected");
    }

    async fn transport_handle(&self) -> Result<Arc<StdioTransport>, McpError> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::Connection("not connected".into()))
    }
}

/// Issue a request on the transport and unwrap the JSON-RPC envelope.
async fn request(
    transport: &StdioTransport,
    method: &str,
    params: Option<serde_json::Value>,
    timeout: Duration,
) -> Result<serde_json::Value, McpError> {
    let response = transport.request(method, params, timeout).await?;

    if let Some(error) = response.error {
        return Err(McpError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    response
        .result
        .ok_or_else(|| McpError::Protocol("no result in response".into()))
}

async fn fetch_tools(transport: &StdioTransport) -> Result<Vec<McpToolInfo>, McpError> {
    let value = request(
        transport,
        "tools/list",
        Some(serde_json::json!({})),
        super::DEFAULT_TIMEOUT,
    )
    .await?;
    let result: ToolsListResult = serde_json::from_value(value)?;
    Ok(result.tools)
}

/// Session notification loop: refreshes the tool list on `tools/list_changed`,
/// logs progress, ignores the rest. Ends when the transport's reader exits.
async fn handle_notifications(
    server: String,
    transport: Arc<StdioTransport>,
    tools: Arc<RwLock<Vec<McpToolInfo>>>,
    mut rx: mpsc::UnboundedReceiver<RpcNotification>,
) {
    while let Some(notification) = rx.recv().await {
        match notification.method.as_str() {
            "notifications/tools/list_changed" => {
                info!(%server, "tool list changed, refreshing");
                match fetch_tools(&transport).await {
                    Ok(fresh) => *tools.write().await = fresh,
                    Err(e) => warn!(%server, error = %e, "tool list refresh failed"),
                }
            }
            "notifications/progress" => {
                debug!(%server, params = ?notification.params, "progress");
            }
            other => {
                debug!(%server, method = %other, "ignoring notification");
            }
        }
    }
}

/// Flatten content blocks into the normalized string returned for every
/// MCP tool call, regardless of server.
pub(crate) fn flatten_content(content: &[ContentBlock]) -> String {
    content
        .iter()
        .map(|c| match c {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Image { mime_type, .. } => format!("[Image: {mime_type}]"),
            ContentBlock::Resource { uri } => format!("[Resource: {uri}]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Expand `${VAR}` references against the process environment.
/// Unset variables expand to the empty string.
pub(crate) fn expand_env_vars(value: &str) -> String {
    let re = regex::Regex::new(r"\$\{(\w+)\}").unwrap();
    re.replace_all(value, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}
