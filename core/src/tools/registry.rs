use super::error::{ToolError, ToolResult};
use super::traits::Tool;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A registry for managing available tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn Tool>>>,
    call_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Register a tool; a later tool with the same name replaces the earlier one
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        info!(target: "tool_registry", tool = %name, "Registering tool");

        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(target: "tool_registry", tool = %name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.clone())
    }

    /// List all registered tools
    pub fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.iter().map(|t| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Call a tool by name with timeout
    #[tracing::instrument(skip(self, arguments), fields(tool.name = %name))]
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult<Value> {
        let start_time = Instant::now();

        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => arguments,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };

        let limit = tool
            .call_timeout()
            .map_or(self.call_timeout, |own| own.max(self.call_timeout));

        debug!(target: "tool_registry", tool = %name, timeout_ms = limit.as_millis() as u64, "Invoking tool");

        let result = match timeout(limit, tool.call(arguments)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(target: "tool_registry", tool = %name, "Tool execution timed out");
                Err(ToolError::Timeout(name.to_string(), limit))
            }
        };

        let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => {
                debug!(target: "tool_registry", tool = %name, elapsed_ms = elapsed_ms, "Tool call finished")
            }
            Err(e) => {
                warn!(target: "tool_registry", tool = %name, elapsed_ms = elapsed_ms, error = %e, "Tool execution failed")
            }
        }

        result
    }
}
