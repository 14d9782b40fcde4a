use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool '{0}' timed out after {1:?}")]
    Timeout(String, std::time::Duration),
}

pub type ToolResult<T> = Result<T, ToolError>;
