/// MCP wire types
///
/// JSON envelopes exchanged with a remote tool server over its event stream
/// and the three derived plain-HTTP endpoints (`/health`, `/tools`, `/execute`).
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Default connection timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Stream path suffixes recognised for endpoint derivation
const STREAM_SUFFIXES: &[&str] = &["/events", "/sse"];

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn empty_schema() -> Value {
    Value::Object(Default::default())
}

/// MCP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name/identifier, unique per manager
    pub name: String,
    /// Event stream URL (e.g. `http://localhost:3001/events`)
    pub url: String,
    /// Bearer token sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Extra HTTP headers sent on every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Timeout in seconds for the stream connection, listing fetch and execute POST
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Server only speaks the event stream and has no `/tools` endpoint
    #[serde(default)]
    pub stream_only: bool,
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            auth_token: None,
            headers: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            stream_only: false,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_stream_only(mut self, stream_only: bool) -> Self {
        self.stream_only = stream_only;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Check the configuration before a client is built from it
    pub fn validate(&self) -> Result<(), McpError> {
        if self.name.trim().is_empty() {
            return Err(McpError::InvalidConfig("server name is empty".to_string()));
        }
        if self.timeout == 0 {
            return Err(McpError::InvalidConfig(format!(
                "server '{}': timeout must be greater than zero",
                self.name
            )));
        }
        let url = self.parsed_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(McpError::InvalidConfig(format!(
                "server '{}': unsupported URL scheme '{}'",
                self.name,
                url.scheme()
            )));
        }
        self.header_map()?;
        Ok(())
    }

    /// Extra headers merged with the bearer token, applied to every request
    pub fn header_map(&self) -> Result<HeaderMap, McpError> {
        let mut map = HeaderMap::new();

        if let Some(ref headers) = self.headers {
            for (key, val) in headers {
                let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    McpError::InvalidConfig(format!("invalid header name '{}': {}", key, e))
                })?;
                let value = HeaderValue::from_str(val).map_err(|e| {
                    McpError::InvalidConfig(format!("invalid value for header '{}': {}", key, e))
                })?;
                map.insert(name, value);
            }
        }

        if let Some(ref token) = self.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| McpError::InvalidConfig(format!("invalid auth token: {}", e)))?;
            value.set_sensitive(true);
            map.insert(AUTHORIZATION, value);
        }

        Ok(map)
    }

    /// Health check URL (`/events` or `/sse` → `/health`)
    pub fn health_url(&self) -> Option<String> {
        self.derive_endpoint("/health")
    }

    /// Tool listing URL (`/events` or `/sse` → `/tools`)
    pub fn tools_url(&self) -> Option<String> {
        self.derive_endpoint("/tools")
    }

    /// Tool execution URL (`/events` or `/sse` → `/execute`)
    pub fn execute_url(&self) -> Option<String> {
        self.derive_endpoint("/execute")
    }

    fn parsed_url(&self) -> Result<Url, McpError> {
        Url::parse(&self.url).map_err(|e| {
            McpError::InvalidConfig(format!("server '{}': invalid URL '{}': {}", self.name, self.url, e))
        })
    }

    fn derive_endpoint(&self, replacement: &str) -> Option<String> {
        let mut url = self.parsed_url().ok()?;
        let path = url.path().to_string();
        let base = STREAM_SUFFIXES
            .iter()
            .find_map(|suffix| path.strip_suffix(suffix))?;
        url.set_path(&format!("{}{}", base, replacement));
        Some(url.to_string())
    }
}

/// Remote tool descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    /// Unique within its owning server
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the accepted parameters
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
    /// Owning server; filled in locally when the descriptor is registered
    #[serde(default)]
    pub server_name: String,
}

impl McpTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            server_name: String::new(),
        }
    }
}

/// `GET /tools` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResponse {
    #[serde(default)]
    pub tools: Vec<McpTool>,
}

/// `POST /execute` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Always `"tool_call"`
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: String,
    pub tool_name: String,
    pub parameters: Value,
}

impl ToolCallRequest {
    pub fn new(request_id: impl Into<String>, tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "tool_call".to_string(),
            request_id: request_id.into(),
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Payload of a `tool_response` stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Events pushed by the server over the stream, keyed by their `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ToolResponse(ToolResponse),
    ToolsList {
        #[serde(default)]
        tools: Vec<McpTool>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// MCP error types
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("MCP server not connected: {0}")]
    NotConnected(String),

    #[error("MCP server already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{context} failed with HTTP status {status}")]
    HttpStatus { status: u16, context: String },

    #[error("Timeout")]
    Timeout,

    #[error("Event stream closed")]
    StreamClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl McpError {
    /// Convert to error code string
    pub fn code(&self) -> &'static str {
        match self {
            McpError::Transport(_) => "TRANSPORT_ERROR",
            McpError::Protocol(_) => "PROTOCOL_ERROR",
            McpError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            McpError::NotConnected(_) => "NOT_CONNECTED",
            McpError::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            McpError::InvalidState(_) => "INVALID_STATE",
            McpError::HttpStatus { .. } => "HTTP_STATUS",
            McpError::Timeout => "TIMEOUT",
            McpError::StreamClosed => "STREAM_CLOSED",
            McpError::InvalidConfig(_) => "INVALID_CONFIG",
            McpError::Json(_) => "JSON_ERROR",
            McpError::Http(_) => "HTTP_ERROR",
        }
    }
}
