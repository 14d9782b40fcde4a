/// MCP Tool Adapter
///
/// Exposes one remote tool through the unified [`Tool`] trait. Every
/// invocation yields text: remote failures are rendered, never propagated.
use super::client::McpClient;
use super::types::McpTool;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Adapts an MCP tool to the unified Tool trait
pub struct McpToolAdapter {
    /// MCP client (shared among all tools from same server)
    client: Arc<McpClient>,
    /// Tool definition
    tool: McpTool,
}

impl McpToolAdapter {
    pub fn new(client: Arc<McpClient>, tool: McpTool) -> Self {
        Self { client, tool }
    }

    pub fn server_name(&self) -> &str {
        self.client.name()
    }

    pub fn tool(&self) -> &McpTool {
        &self.tool
    }

    /// `server:tool`, for logs
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.server_name(), self.tool.name)
    }

    /// Run the remote tool and render the outcome as text
    pub async fn invoke(&self, arguments: Value) -> String {
        debug!(
            target: "mcp_adapter",
            tool = %self.qualified_name(),
            "Invoking MCP tool"
        );

        match self.client.call_tool(&self.tool.name, arguments).await {
            Ok(result) => format_result(&result),
            Err(e) => {
                warn!(
                    target: "mcp_adapter",
                    tool = %self.qualified_name(),
                    code = e.code(),
                    error = %e,
                    "MCP tool call failed"
                );
                format!("Tool execution error: {}", e)
            }
        }
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> String {
        self.tool.name.clone()
    }

    fn description(&self) -> String {
        self.tool.description.clone()
    }

    fn parameters(&self) -> Value {
        self.tool.input_schema.clone()
    }

    /// Failures must come back as text, so the registry may not time out first
    fn call_timeout(&self) -> Option<Duration> {
        Some(self.client.call_ceiling())
    }

    async fn call(&self, arguments: Value) -> ToolResult<Value> {
        Ok(Value::String(self.invoke(arguments).await))
    }
}

/// Render a remote result for a text-oriented caller
pub fn format_result(result: &Value) -> String {
    let Some(obj) = result.as_object() else {
        return text_of(result);
    };

    if let Some(error) = obj.get("error") {
        return format!("Tool execution error: {}", text_of(error));
    }
    if let Some(content) = obj.get("content") {
        return text_of(content);
    }
    if let Some(message) = obj.get("message") {
        return text_of(message);
    }
    serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
