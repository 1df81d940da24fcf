// ABOUTME: MCP manager - owns the set of MCP clients built from declarative configs.
// ABOUTME: Merges server tools into one namespace with collision resolution and routes calls.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::client::McpClient;
use super::{McpToolInfo, ServerConfig, ServersFile};
use crate::error::McpError;

/// One MCP tool as registered in the manager's flat namespace.
///
/// `registered_name` is the key callers use; `original_name` is what the
/// owning server knows the tool as. They differ only when the short name
/// was taken and the qualified `mcp_<server>_<tool>` form was used.
#[derive(Debug, Clone)]
pub struct McpToolEntry {
    pub registered_name: String,
    pub original_name: String,
    pub server: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Connection snapshot for one server.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub connected: bool,
    pub tool_count: usize,
}

/// Manages every configured MCP server and the merged tool catalog.
pub struct McpManager {
    config_path: Option<PathBuf>,
    clients: RwLock<HashMap<String, Arc<McpClient>>>,
    tools: RwLock<HashMap<String, McpToolEntry>>,
}

impl McpManager {
    /// Create a manager that loads server configs from the given file.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(config_path.into()),
            clients: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Create a manager with no config file. Useful when no servers are
    /// configured; every operation is a no-op on an empty catalog.
    pub fn disabled() -> Self {
        Self {
            config_path: None,
            clients: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Load and validate the server config file.
    ///
    /// Disabled entries and entries without a command are skipped with a
    /// warning. A missing or malformed file yields an empty list, never an
    /// error: a bad config must not take the rest of the system down.
    pub fn load_config(&self) -> Vec<ServerConfig> {
        let Some(path) = &self.config_path else {
            return Vec::new();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "server config not readable");
                return Vec::new();
            }
        };

        let file: ServersFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid server config");
                return Vec::new();
            }
        };

        let mut configs: Vec<ServerConfig> = Vec::new();
        for (name, entry) in file.servers {
            if !entry.enabled {
                info!(server = %name, "skipping disabled server");
                continue;
            }
            if entry.command.is_empty() {
                warn!(server = %name, "skipping server config with no command");
                continue;
            }
            configs.push(ServerConfig {
                name,
                command: entry.command,
                args: entry.args,
                env: entry.env,
                enabled: entry.enabled,
            });
        }
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    /// Connect every enabled server and register its tools. Best-effort:
    /// a server that fails to connect is skipped and the others still
    /// register. Returns the number of servers that connected.
    ///
    /// `reserved` holds names already claimed outside the MCP namespace
    /// (builtin, plugin, and instruction tools); a colliding tool falls
    /// back to its qualified name.
    pub async fn initialize_all(&self, reserved: &HashSet<String>) -> usize {
        let configs = self.load_config();
        let mut connected = 0;

        for config in configs {
            let name = config.name.clone();
            let client = Arc::new(McpClient::new(config));

            match client.connect().await {
                Ok(()) => {
                    let tools = match client.list_tools().await {
                        Ok(tools) => tools,
                        Err(e) => {
                            warn!(server = %name, error = %e, "tools/list failed");
                            Vec::new()
                        }
                    };
                    self.clients.write().await.insert(name.clone(), client);
                    self.register_server_tools(&name, tools, reserved).await;
                    connected += 1;
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "connection failed, skipping server");
                }
            }
        }

        let tool_count = self.tools.read().await.len();
        info!(servers = connected, tools = tool_count, "MCP initialization complete");
        connected
    }

    /// Register tools under their preferred short names, falling back to
    /// `mcp_<server>_<tool>` when the short name is already claimed.
    pub(crate) async fn register_server_tools(
        &self,
        server: &str,
        tools: Vec<McpToolInfo>,
        reserved: &HashSet<String>,
    ) {
        let mut catalog = self.tools.write().await;
        for tool in tools {
            let taken = reserved.contains(&tool.name) || catalog.contains_key(&tool.name);
            let registered_name = if taken {
                let qualified = format!("mcp_{}_{}", server, tool.name);
                warn!(
                    server,
                    tool = %tool.name,
                    qualified = %qualified,
                    "short name already claimed, registering qualified name"
                );
                qualified
            } else {
                tool.name.clone()
            };

            catalog.insert(
                registered_name.clone(),
                McpToolEntry {
                    registered_name,
                    original_name: tool.name,
                    server: server.to_string(),
                    description: tool.description,
                    input_schema: tool.input_schema,
                },
            );
        }
    }

    /// Whether a name is in the MCP namespace (short or qualified).
    pub async fn is_registered(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Snapshot of every registered MCP tool.
    pub async fn tool_entries(&self) -> Vec<McpToolEntry> {
        let mut entries: Vec<_> = self.tools.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.registered_name.cmp(&b.registered_name));
        entries
    }

    /// Route a tool call to its owning server, using the server-side
    /// original name when the registered name was qualified.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, McpError> {
        let (original, client) = {
            let tools = self.tools.read().await;
            let entry = tools
                .get(name)
                .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;
            let clients = self.clients.read().await;
            let client = clients
                .get(&entry.server)
                .cloned()
                .ok_or_else(|| McpError::Connection(format!("server '{}' not connected", entry.server)))?;
            (entry.original_name.clone(), client)
        };

        client.call_tool(&original, arguments, timeout).await
    }

    /// Disconnect and reconnect one server, touching only its tools.
    pub async fn reconnect_server(
        &self,
        server: &str,
        reserved: &HashSet<String>,
    ) -> Result<(), McpError> {
        let client = self
            .clients
            .read()
            .await
            .get(server)
            .cloned()
            .ok_or_else(|| McpError::Connection(format!("unknown server '{server}'")))?;

        self.tools
            .write()
            .await
            .retain(|_, entry| entry.server != server);

        client.disconnect().await;
        client.connect().await?;
        let tools = client.list_tools().await?;
        self.register_server_tools(server, tools, reserved).await;
        Ok(())
    }

    /// Per-server connection status.
    pub async fn server_status(&self) -> HashMap<String, ServerStatus> {
        let clients = self.clients.read().await;
        let tools = self.tools.read().await;
        clients
            .iter()
            .map(|(name, client)| {
                let tool_count = tools.values().filter(|e| &e.server == name).count();
                (
                    name.clone(),
                    ServerStatus {
                        connected: client.connected(),
                        tool_count,
                    },
                )
            })
            .collect()
    }

    /// Disconnect every client and clear all catalogs. Used at process
    /// exit and as the first step of a full reload.
    pub async fn shutdown_all(&self) {
        let clients: Vec<_> = self.clients.write().await.drain().collect();
        for (_, client) in clients {
            client.disconnect().await;
        }
        self.tools.write().await.clear();
        info!("all MCP connections closed");
    }

    /// Full reload: shut everything down, then re-scan the config.
    pub async fn reload(&self, reserved: &HashSet<String>) -> usize {
        self.shutdown_all().await;
        self.initialize_all(reserved).await
    }
}
