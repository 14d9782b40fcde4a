use super::error::ToolResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Invocable tool as seen by the agent framework
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of the tool (e.g., "read_file")
    fn name(&self) -> String;

    /// A human-readable description of what the tool does
    fn description(&self) -> String;

    /// The JSON Schema for the tool's arguments
    fn parameters(&self) -> Value;

    /// Longest a single call may legitimately take. The registry never
    /// cuts a call off before this; `None` defers to the registry timeout.
    fn call_timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute the tool with the given arguments
    async fn call(&self, arguments: Value) -> ToolResult<Value>;
}
