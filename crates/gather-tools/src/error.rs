use thiserror::Error;

/// Failure of a single tool call, as reported back to the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {0}")]
    ToolExecutionFailed(String),
}

impl ToolError {
    /// Stable kind label placed in the `errorKind` field of a response.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::ToolNotFound(_) => "ToolNotFound",
            ToolError::ToolExecutionFailed(_) => "ToolExecutionFailed",
        }
    }
}

/// Errors raised by an [`IntegrationExecutor`](crate::IntegrationExecutor).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The request never got a response: DNS, connect, TLS, or a browser-style
    /// fetch failure.
    #[error("network error: {0}")]
    Network(String),

    /// The remote service answered with a failure.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("unsupported integration: {0}")]
    Unsupported(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ExecutionError::Remote(format!("HTTP {}: {}", status.as_u16(), err)),
            None => ExecutionError::Network(err.to_string()),
        }
    }
}
