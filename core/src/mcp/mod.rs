/// Remote tool servers over SSE + HTTP
///
/// A server exposes a long-lived event stream plus sibling `/health`,
/// `/tools` and `/execute` endpoints. Calls go out as HTTP POSTs and their
/// results come back on the stream, correlated by request id.
///
/// Architecture:
/// - `client`: one connection (state machine, listener task, pending calls)
/// - `sse`: incremental event-stream decoder
/// - `registry`: per-server tool descriptors
/// - `adapter`: exposes remote tools through the `Tool` trait
/// - `manager`: owns every connection and the flat adapter list
/// - `supervisor`: optional reconnect loop
/// - `types`: configuration, wire messages and errors
pub mod adapter;
pub mod client;
pub mod manager;
pub mod registry;
pub mod sse;
pub mod supervisor;
pub mod types;

pub use adapter::{format_result, McpToolAdapter};
pub use client::{ConnectionState, McpClient, HEALTH_CHECK_TIMEOUT, RESPONSE_TIMEOUT};
pub use manager::{ClientHook, McpManager, ServerStatus};
pub use registry::ToolDescriptorRegistry;
pub use sse::{SseDecoder, SseEvent};
pub use supervisor::{McpSupervisor, ReconnectOutcome};
pub use types::{
    McpError, McpServerConfig, McpTool, StreamEvent, ToolCallRequest, ToolResponse,
    DEFAULT_TIMEOUT_SECS,
};
