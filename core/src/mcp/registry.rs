/// Per-server tool descriptor registry
///
/// Written by both the listing fetch and `tools_list` push events. Every
/// write is an upsert keyed by tool name; nothing is ever removed.
use super::types::McpTool;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct ToolDescriptorRegistry {
    server_name: String,
    tools: Arc<DashMap<String, McpTool>>,
}

impl ToolDescriptorRegistry {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            tools: Arc::new(DashMap::new()),
        }
    }

    /// Insert or overwrite one descriptor, stamping it with the owning server
    pub fn upsert(&self, mut tool: McpTool) {
        tool.server_name = self.server_name.clone();
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Upsert a batch, returning the registry size afterwards
    pub fn upsert_all(&self, tools: Vec<McpTool>) -> usize {
        let received = tools.len();
        for tool in tools {
            self.upsert(tool);
        }
        let total = self.tools.len();
        debug!(
            target: "mcp_client",
            server = %self.server_name,
            received = received,
            total = total,
            "Updated tool registry"
        );
        total
    }

    pub fn get(&self, name: &str) -> Option<McpTool> {
        self.tools.get(name).map(|t| t.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Snapshot of all descriptors, sorted by name
    pub fn snapshot(&self) -> Vec<McpTool> {
        let mut tools: Vec<McpTool> = self.tools.iter().map(|t| t.value().clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}
