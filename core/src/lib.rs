// Tether Core Library
// Bridges remote tool servers (SSE + HTTP) into a local tool registry

pub mod config;
pub mod mcp;
pub mod telemetry;
pub mod tools;

pub use config::{McpConfig, McpSettings};
pub use mcp::{
    ConnectionState, McpClient, McpError, McpManager, McpServerConfig, McpSupervisor, McpTool,
    McpToolAdapter, ServerStatus,
};
pub use telemetry::init_logging;
pub use tools::{Tool, ToolError, ToolRegistry, ToolResult};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),
}

pub type Result<T> = std::result::Result<T, TetherError>;
