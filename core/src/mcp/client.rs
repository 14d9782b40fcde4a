/// MCP Client implementation
///
/// One client per remote server. Keeps a long-lived SSE stream open and
/// correlates `tool_call` POSTs with `tool_response` events by request ID.
use super::registry::ToolDescriptorRegistry;
use super::sse::SseDecoder;
use super::types::*;
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Health check timeout, independent of the configured server timeout
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling for waiting on a `tool_response` after the execute POST was acknowledged
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Unconnected = 0,
    Connecting = 1,
    Active = 2,
    Disconnected = 3,
    Failed = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Unconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Active,
            3 => ConnectionState::Disconnected,
            _ => ConnectionState::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Connecting/Active → Disconnected; any other state is left alone
    fn close(&self) -> bool {
        self.transition(ConnectionState::Active, ConnectionState::Disconnected)
            || self.transition(ConnectionState::Connecting, ConnectionState::Disconnected)
    }
}

/// Pending requests: request_id -> response channel
type PendingTable = Arc<DashMap<String, oneshot::Sender<ToolResponse>>>;

/// Removes a pending entry however the owning call ends (success, error, timeout, drop)
struct PendingGuard<'a> {
    table: &'a PendingTable,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.request_id);
    }
}

/// MCP client for communicating with a single MCP server
pub struct McpClient {
    /// Server configuration
    config: McpServerConfig,
    /// HTTP client carrying the merged default headers
    http: Client,
    /// Tool descriptors known for this server
    tools: ToolDescriptorRegistry,
    /// Pending requests awaiting a `tool_response`
    pending: PendingTable,
    /// Request ID counter
    request_counter: AtomicU64,
    /// Lifecycle state, shared with the listener task
    state: Arc<StateCell>,
    /// Stream listener task
    listener: Mutex<Option<JoinHandle<()>>>,
    /// How long `call_tool` waits for the streamed response
    response_timeout: Duration,
}

impl McpClient {
    /// Create a new MCP client with configuration
    pub fn new(config: McpServerConfig) -> Result<Self, McpError> {
        config.validate()?;

        let http = Client::builder()
            .default_headers(config.header_map()?)
            .connect_timeout(config.timeout())
            .build()?;

        Ok(Self {
            tools: ToolDescriptorRegistry::new(config.name.clone()),
            config,
            http,
            pending: Arc::new(DashMap::new()),
            request_counter: AtomicU64::new(0),
            state: Arc::new(StateCell::new(ConnectionState::Unconnected)),
            listener: Mutex::new(None),
            response_timeout: RESPONSE_TIMEOUT,
        })
    }

    /// Override the response wait ceiling (defaults to [`RESPONSE_TIMEOUT`])
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Probe health, open the event stream and fetch the tool list
    ///
    /// Ends in `Failed` when the stream cannot be opened. Once the listener
    /// is running, a later failure leaves the client `Disconnected`.
    pub async fn connect(&self) -> Result<(), McpError> {
        if !self
            .state
            .transition(ConnectionState::Unconnected, ConnectionState::Connecting)
        {
            return Err(McpError::InvalidState(format!(
                "cannot connect '{}' while {}",
                self.config.name,
                self.state()
            )));
        }

        info!(
            target: "mcp_client",
            server = %self.config.name,
            url = %self.config.url,
            "Connecting to MCP server"
        );

        self.check_health().await;

        let response = match self.open_stream().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    target: "mcp_client",
                    server = %self.config.name,
                    error = %e,
                    "Failed to open event stream"
                );
                self.state.store(ConnectionState::Failed);
                return Err(e);
            }
        };

        let handle = self.spawn_listener(response);
        *self.listener.lock().await = Some(handle);

        if let Err(e) = self.load_tools().await {
            error!(
                target: "mcp_client",
                server = %self.config.name,
                error = %e,
                "Failed to load tool list"
            );
            self.stop_listener().await;
            self.state.store(ConnectionState::Disconnected);
            self.pending.clear();
            return Err(e);
        }

        if self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Active)
        {
            info!(
                target: "mcp_client",
                server = %self.config.name,
                tool_count = self.tools.len(),
                "MCP server connected"
            );
            Ok(())
        } else {
            warn!(
                target: "mcp_client",
                server = %self.config.name,
                "Event stream closed before connect completed"
            );
            self.stop_listener().await;
            Err(McpError::StreamClosed)
        }
    }

    /// Stop the listener and fail any in-flight calls
    pub async fn disconnect(&self) {
        info!(target: "mcp_client", server = %self.config.name, "Disconnecting from MCP server");

        self.stop_listener().await;
        self.state.close();
        self.pending.clear();
    }

    /// Invoke a remote tool and wait for its streamed result
    pub async fn call_tool(&self, name: &str, parameters: Value) -> Result<Value, McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected(self.config.name.clone()));
        }
        if !self.tools.contains(name) {
            return Err(McpError::ToolNotFound(name.to_string()));
        }
        let execute_url = self.config.execute_url().ok_or_else(|| {
            McpError::InvalidConfig(format!(
                "server '{}': no execute endpoint derivable from '{}'",
                self.config.name, self.config.url
            ))
        })?;

        let (request_id, rx, _guard) = self.register_pending()?;

        debug!(
            target: "mcp_client",
            server = %self.config.name,
            tool = %name,
            request_id = %request_id,
            "Calling tool"
        );

        let request = ToolCallRequest::new(request_id.clone(), name, parameters);
        let response = self
            .http
            .post(&execute_url)
            .timeout(self.config.timeout())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                target: "mcp_client",
                server = %self.config.name,
                tool = %name,
                status = status.as_u16(),
                "Execute request rejected"
            );
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                context: "execute request".to_string(),
            });
        }

        let delivered = match timeout(self.response_timeout, rx).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(_)) => return Err(McpError::StreamClosed),
            Err(_) => {
                warn!(
                    target: "mcp_client",
                    server = %self.config.name,
                    tool = %name,
                    request_id = %request_id,
                    "Request timeout"
                );
                return Err(McpError::Timeout);
            }
        };

        delivered.result.ok_or_else(|| {
            McpError::Protocol(format!("tool_response for {} carried no result", request_id))
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Upper bound on one `call_tool`: the execute POST plus the wait for
    /// its streamed response, with a second of slack
    pub fn call_ceiling(&self) -> Duration {
        self.config.timeout() + self.response_timeout + Duration::from_secs(1)
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Snapshot of the known tool descriptors
    pub fn tools(&self) -> Vec<McpTool> {
        self.tools.snapshot()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Number of calls currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Add a pending entry, then confirm the stream is still up. The listener
    /// flips the state before clearing the table, so an entry added after the
    /// clear is caught here instead of waiting out the response timeout.
    fn register_pending(
        &self,
    ) -> Result<(String, oneshot::Receiver<ToolResponse>, PendingGuard<'_>), McpError> {
        let request_id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        let guard = PendingGuard {
            table: &self.pending,
            request_id: request_id.clone(),
        };

        if !self.is_connected() {
            return Err(McpError::NotConnected(self.config.name.clone()));
        }
        Ok((request_id, rx, guard))
    }

    fn next_request_id(&self) -> String {
        let n = self.request_counter.fetch_add(1, Ordering::SeqCst);
        format!("req_{}_{}", n, Utc::now().timestamp())
    }

    async fn check_health(&self) {
        let Some(url) = self.config.health_url() else {
            debug!(target: "mcp_client", server = %self.config.name, "No health endpoint, skipping health check");
            return;
        };

        match self.http.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(target: "mcp_client", server = %self.config.name, "Health check passed");
            }
            Ok(response) => {
                warn!(
                    target: "mcp_client",
                    server = %self.config.name,
                    status = response.status().as_u16(),
                    "Health check failed, continuing with event stream"
                );
            }
            Err(e) => {
                warn!(
                    target: "mcp_client",
                    server = %self.config.name,
                    error = %e,
                    "Health check errored, continuing with event stream"
                );
            }
        }
    }

    async fn load_tools(&self) -> Result<(), McpError> {
        if self.config.stream_only {
            debug!(
                target: "mcp_client",
                server = %self.config.name,
                "Stream-only server, waiting for tools_list events"
            );
            return Ok(());
        }
        self.fetch_tools().await.map(|_| ())
    }

    async fn open_stream(&self) -> Result<Response, McpError> {
        let request = self
            .http
            .get(&self.config.url)
            .header(ACCEPT, "text/event-stream")
            .send();

        let response = timeout(self.config.timeout(), request)
            .await
            .map_err(|_| {
                McpError::Transport(format!(
                    "timed out opening event stream after {}s",
                    self.config.timeout
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                context: "event stream request".to_string(),
            });
        }
        Ok(response)
    }

    async fn fetch_tools(&self) -> Result<usize, McpError> {
        let Some(url) = self.config.tools_url() else {
            warn!(
                target: "mcp_client",
                server = %self.config.name,
                url = %self.config.url,
                "No tools endpoint derivable, relying on tools_list events"
            );
            return Ok(self.tools.len());
        };

        let response = self
            .http
            .get(&url)
            .timeout(self.config.timeout())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            warn!(
                target: "mcp_client",
                server = %self.config.name,
                status = response.status().as_u16(),
                "Could not fetch tool list"
            );
            return Ok(self.tools.len());
        }

        let listing: ListToolsResponse = response.json().await?;
        let total = self.tools.upsert_all(listing.tools);

        info!(
            target: "mcp_client",
            server = %self.config.name,
            count = total,
            "Loaded tools"
        );
        Ok(total)
    }

    fn spawn_listener(&self, response: Response) -> JoinHandle<()> {
        let server_name = self.config.name.clone();
        let tools = self.tools.clone();
        let pending = Arc::clone(&self.pending);
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for event in decoder.feed(&bytes) {
                            dispatch_event(&server_name, &event.data, &tools, &pending);
                        }
                    }
                    Err(e) => {
                        error!(
                            target: "mcp_client",
                            server = %server_name,
                            error = %e,
                            "Event stream error"
                        );
                        break;
                    }
                }
            }

            state.close();
            pending.clear();
            warn!(target: "mcp_client", server = %server_name, "Event stream listener exited");
        })
    }

    async fn stop_listener(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

/// Route one SSE `data` payload to the registry or a pending call
fn dispatch_event(
    server_name: &str,
    data: &str,
    tools: &ToolDescriptorRegistry,
    pending: &PendingTable,
) {
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                target: "mcp_client",
                server = %server_name,
                error = %e,
                data = %data,
                "Failed to parse event data"
            );
            return;
        }
    };

    match serde_json::from_value::<StreamEvent>(value) {
        Ok(StreamEvent::ToolResponse(response)) => {
            match pending.remove(&response.request_id) {
                Some((request_id, tx)) => {
                    if tx.send(response).is_err() {
                        debug!(
                            target: "mcp_client",
                            server = %server_name,
                            request_id = %request_id,
                            "Caller gone before response arrived"
                        );
                    }
                }
                None => {
                    debug!(
                        target: "mcp_client",
                        server = %server_name,
                        request_id = %response.request_id,
                        "Received response for unknown request"
                    );
                }
            }
        }
        Ok(StreamEvent::ToolsList { tools: list }) => {
            tools.upsert_all(list);
        }
        Ok(StreamEvent::Error { message }) => {
            error!(
                target: "mcp_client",
                server = %server_name,
                message = %message.as_deref().unwrap_or("Unknown error"),
                "MCP server reported error"
            );
        }
        Ok(StreamEvent::Unknown) => {
            debug!(target: "mcp_client", server = %server_name, "Ignoring event of unknown type");
        }
        Err(e) => {
            debug!(
                target: "mcp_client",
                server = %server_name,
                error = %e,
                "Ignoring unrecognised event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> PendingTable {
        Arc::new(DashMap::new())
    }

    #[test]
    fn test_dispatch_delivers_matching_response_once() {
        let tools = ToolDescriptorRegistry::new("s");
        let pending = table();
        let (tx, mut rx) = oneshot::channel();
        pending.insert("req_0_1".to_string(), tx);

        let data = json!({"type": "tool_response", "request_id": "req_0_1", "result": {"content": "pong"}})
            .to_string();
        dispatch_event("s", &data, &tools, &pending);
        // A duplicate must be dropped silently
        dispatch_event("s", &data, &tools, &pending);

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.result, Some(json!({"content": "pong"})));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_dispatch_ignores_unknown_request_ids() {
        let tools = ToolDescriptorRegistry::new("s");
        let pending = table();
        let (tx, mut rx) = oneshot::channel();
        pending.insert("req_0_1".to_string(), tx);

        let data = json!({"type": "tool_response", "request_id": "req_9_9", "result": {}}).to_string();
        dispatch_event("s", &data, &tools, &pending);

        assert!(rx.try_recv().is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_dispatch_tools_list_upserts() {
        let tools = ToolDescriptorRegistry::new("s");
        tools.upsert(McpTool::new("keep", "k", json!({})));
        let pending = table();

        let data = json!({"type": "tools_list", "tools": [{"name": "added", "description": "a"}]})
            .to_string();
        dispatch_event("s", &data, &tools, &pending);

        assert_eq!(tools.len(), 2);
        assert_eq!(tools.get("added").unwrap().server_name, "s");
    }

    #[test]
    fn test_dispatch_survives_malformed_and_error_events() {
        let tools = ToolDescriptorRegistry::new("s");
        let pending = table();

        dispatch_event("s", "not json at all", &tools, &pending);
        dispatch_event("s", r#"{"no_type": true}"#, &tools, &pending);
        dispatch_event("s", r#"{"type": "error", "message": "boom"}"#, &tools, &pending);
        dispatch_event("s", r#"{"type": "tool_response"}"#, &tools, &pending);

        assert!(tools.is_empty());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = McpClient::new(McpServerConfig::new("", "http://x/events"));
        assert!(matches!(result, Err(McpError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_call_tool_requires_connection() {
        let client = McpClient::new(McpServerConfig::new("s", "http://127.0.0.1:1/events")).unwrap();
        assert_eq!(client.state(), ConnectionState::Unconnected);

        let err = client.call_tool("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected(_)));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server_fails() {
        let config = McpServerConfig::new("dead", "http://127.0.0.1:1/events").with_timeout(2);
        let client = McpClient::new(config).unwrap();

        assert!(client.connect().await.is_err());
        assert_eq!(client.state(), ConnectionState::Failed);

        // Failed is terminal
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::InvalidState(_)));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let client = McpClient::new(McpServerConfig::new("s", "http://x/events")).unwrap();
        let a = client.next_request_id();
        let b = client.next_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("req_0_"));
        assert!(b.starts_with("req_1_"));
    }

    #[test]
    fn test_pending_entry_is_dropped_when_stream_is_down() {
        let client = McpClient::new(McpServerConfig::new("s", "http://x/events")).unwrap();

        // Stream already gone: the entry must not outlive the failed call
        client.state.store(ConnectionState::Disconnected);
        let err = client.register_pending().err().unwrap();
        assert!(matches!(err, McpError::NotConnected(_)));
        assert_eq!(client.pending_count(), 0);

        client.state.store(ConnectionState::Active);
        let (request_id, _rx, guard) = client.register_pending().unwrap();
        assert!(request_id.starts_with("req_1_"));
        assert_eq!(client.pending_count(), 1);
        drop(guard);
        assert_eq!(client.pending_count(), 0);
    }
}
