/// MCP Manager
///
/// Manages multiple MCP server connections and the flat list of tool
/// adapters built from them. Adapters are a snapshot taken when a server
/// becomes active; tools pushed later stay in the client's registry until
/// [`McpManager::resync_tools`] is called.
use super::adapter::McpToolAdapter;
use super::client::{ConnectionState, McpClient};
use super::types::{McpError, McpServerConfig};
use crate::tools::{Tool, ToolRegistry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Adjusts a client before it connects; kept so reconnects are built the same way
pub type ClientHook = Arc<dyn Fn(McpClient) -> McpClient + Send + Sync>;

struct ServerEntry {
    client: Arc<McpClient>,
    hook: Option<ClientHook>,
}

/// Per-server status entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub connected: bool,
    pub state: ConnectionState,
    pub tools_count: usize,
    pub url: String,
}

/// MCP Manager
///
/// Whenever both maps are locked, `clients` is taken before `tools`.
pub struct McpManager {
    /// Registered servers: server_name -> client and its configure hook
    clients: RwLock<HashMap<String, ServerEntry>>,
    /// Adapters for every tool of every registered server
    tools: RwLock<Vec<Arc<McpToolAdapter>>>,
    /// Names with a connect in flight
    connecting: Mutex<HashSet<String>>,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpManager {
    /// Create a new MCP manager
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            tools: RwLock::new(Vec::new()),
            connecting: Mutex::new(HashSet::new()),
        }
    }

    /// Add and connect to an MCP server, returning the number of tools bridged
    pub async fn add_server(&self, config: McpServerConfig) -> Result<usize, McpError> {
        self.add_configured(config, None).await
    }

    /// Like [`add_server`](Self::add_server) but lets the caller tune the client before it connects
    ///
    /// The hook is kept with the server and applied again on every reconnect.
    pub async fn add_server_with<F>(&self, config: McpServerConfig, configure: F) -> Result<usize, McpError>
    where
        F: Fn(McpClient) -> McpClient + Send + Sync + 'static,
    {
        self.add_configured(config, Some(Arc::new(configure))).await
    }

    /// Add a server with an optional stored configure hook
    pub async fn add_configured(
        &self,
        config: McpServerConfig,
        hook: Option<ClientHook>,
    ) -> Result<usize, McpError> {
        let server_name = config.name.clone();

        info!(
            target: "mcp_manager",
            server = %server_name,
            url = %config.url,
            "Adding MCP server"
        );

        self.reserve(&server_name).await?;
        let result = self.connect_and_register(config, hook).await;
        self.release(&server_name);

        if let Err(ref e) = result {
            error!(
                target: "mcp_manager",
                server = %server_name,
                error = %e,
                "Failed to add MCP server"
            );
        }
        result
    }

    /// Add every server in order; failures are logged and skipped
    pub async fn connect_all(&self, configs: Vec<McpServerConfig>) -> usize {
        let total = configs.len();
        let mut connected = 0;
        for config in configs {
            if self.add_server(config).await.is_ok() {
                connected += 1;
            }
        }

        info!(
            target: "mcp_manager",
            connected = connected,
            total = total,
            tool_count = self.tools.read().await.len(),
            "Connected MCP servers"
        );
        connected
    }

    /// Remove and disconnect from an MCP server
    pub async fn remove_server(&self, server_name: &str) -> bool {
        let entry = {
            let mut clients = self.clients.write().await;
            let mut tools = self.tools.write().await;
            let entry = clients.remove(server_name);
            if entry.is_some() {
                tools.retain(|t| t.server_name() != server_name);
            }
            entry
        };

        let Some(entry) = entry else {
            warn!(target: "mcp_manager", server = %server_name, "Server not found");
            return false;
        };

        entry.client.disconnect().await;

        info!(target: "mcp_manager", server = %server_name, "MCP server removed");
        true
    }

    /// Snapshot of every bridged tool
    pub async fn all_tools(&self) -> Vec<Arc<McpToolAdapter>> {
        self.tools.read().await.clone()
    }

    /// Bridged tools of one server (empty for unknown servers)
    pub async fn server_tools(&self, server_name: &str) -> Vec<Arc<McpToolAdapter>> {
        self.tools
            .read()
            .await
            .iter()
            .filter(|t| t.server_name() == server_name)
            .cloned()
            .collect()
    }

    /// Register every bridged tool with an agent tool registry
    pub async fn register_tools(&self, registry: &ToolRegistry) -> usize {
        let tools = self.all_tools().await;
        for tool in &tools {
            registry.register(Arc::clone(tool) as Arc<dyn Tool>);
        }
        tools.len()
    }

    /// Rebuild one server's adapters from its current registry
    ///
    /// Picks up tools delivered by `tools_list` events after the server was added.
    pub async fn resync_tools(&self, server_name: &str) -> Result<usize, McpError> {
        let client = self
            .client(server_name)
            .await
            .ok_or_else(|| McpError::NotConnected(server_name.to_string()))?;

        let adapters = build_adapters(&client);
        let count = adapters.len();

        let mut tools = self.tools.write().await;
        tools.retain(|t| t.server_name() != server_name);
        tools.extend(adapters);

        info!(
            target: "mcp_manager",
            server = %server_name,
            tool_count = count,
            "Resynchronised MCP tools"
        );
        Ok(count)
    }

    /// List registered servers
    pub async fn list_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn client(&self, server_name: &str) -> Option<Arc<McpClient>> {
        self.clients
            .read()
            .await
            .get(server_name)
            .map(|entry| Arc::clone(&entry.client))
    }

    /// Configure hook the server was added with, if any
    pub async fn client_hook(&self, server_name: &str) -> Option<ClientHook> {
        self.clients
            .read()
            .await
            .get(server_name)
            .and_then(|entry| entry.hook.clone())
    }

    pub async fn server_config(&self, server_name: &str) -> Option<McpServerConfig> {
        self.client(server_name).await.map(|c| c.config().clone())
    }

    /// Status of every registered server
    pub async fn status(&self) -> BTreeMap<String, ServerStatus> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(name, ServerEntry { client, .. })| {
                (
                    name.clone(),
                    ServerStatus {
                        connected: client.is_connected(),
                        state: client.state(),
                        tools_count: client.tool_count(),
                        url: client.config().url.clone(),
                    },
                )
            })
            .collect()
    }

    /// Disconnect all servers and drop every adapter
    pub async fn disconnect_all(&self) {
        info!(target: "mcp_manager", "Disconnecting all MCP servers");

        let entries: Vec<_> = {
            let mut clients = self.clients.write().await;
            let mut tools = self.tools.write().await;
            tools.clear();
            clients.drain().collect()
        };

        for (name, entry) in entries {
            debug!(target: "mcp_manager", server = %name, "Disconnecting server");
            entry.client.disconnect().await;
        }
    }

    async fn connect_and_register(
        &self,
        config: McpServerConfig,
        hook: Option<ClientHook>,
    ) -> Result<usize, McpError> {
        let server_name = config.name.clone();
        let client = McpClient::new(config)?;
        let client = Arc::new(match &hook {
            Some(configure) => configure(client),
            None => client,
        });
        client.connect().await?;

        let adapters = build_adapters(&client);
        let count = adapters.len();

        {
            let mut clients = self.clients.write().await;
            let mut tools = self.tools.write().await;
            clients.insert(
                server_name.clone(),
                ServerEntry {
                    client: Arc::clone(&client),
                    hook,
                },
            );
            tools.extend(adapters);
        }

        info!(
            target: "mcp_manager",
            server = %server_name,
            tool_count = count,
            "MCP server added successfully"
        );
        Ok(count)
    }

    /// Claim the name before checking `clients`; a winner inserts its client
    /// before releasing, so a later claimant always sees one or the other.
    async fn reserve(&self, server_name: &str) -> Result<(), McpError> {
        let claimed = self
            .connecting
            .lock()
            .map_err(|_| McpError::InvalidState("manager lock poisoned".to_string()))?
            .insert(server_name.to_string());

        let registered = claimed && self.clients.read().await.contains_key(server_name);
        if registered {
            self.release(server_name);
        }

        if !claimed || registered {
            warn!(
                target: "mcp_manager",
                server = %server_name,
                "Server already registered"
            );
            return Err(McpError::AlreadyRegistered(server_name.to_string()));
        }
        Ok(())
    }

    fn release(&self, server_name: &str) {
        if let Ok(mut connecting) = self.connecting.lock() {
            connecting.remove(server_name);
        }
    }
}

fn build_adapters(client: &Arc<McpClient>) -> Vec<Arc<McpToolAdapter>> {
    client
        .tools()
        .into_iter()
        .map(|tool| Arc::new(McpToolAdapter::new(Arc::clone(client), tool)))
        .collect()
}
