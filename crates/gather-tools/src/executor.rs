use crate::error::ExecutionError;
use async_trait::async_trait;
use gather_types::IntegrationInstance;
use serde_json::Value;

/// Result of running an integration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionOutput {
    pub success: bool,
    pub data: Value,
    /// One-line human summary the model can read back to the caller.
    pub summary: String,
    pub error: Option<String>,
}

impl ExecutionOutput {
    pub fn ok(data: Value, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            summary: summary.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            summary: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Runs integrations on behalf of the model.
#[async_trait]
pub trait IntegrationExecutor: Send + Sync {
    async fn execute(
        &self,
        instance: &IntegrationInstance,
        args: Value,
    ) -> Result<ExecutionOutput, ExecutionError>;
}
