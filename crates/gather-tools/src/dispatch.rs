//! Tool dispatch bridge.
//!
//! Turns model-issued function calls into integration executions and shapes
//! the outcome into the response object the model receives. Every call
//! yields exactly one response; nothing is retried.

use crate::document::{generate_document, DocumentOrigin, DOCUMENT_INTEGRATION_ID};
use crate::error::{ExecutionError, ToolError};
use crate::executor::{ExecutionOutput, IntegrationExecutor};
use crate::registry::ToolRegistry;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default upper bound on a single integration call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser-style fetch failures that usually mean the request went out but
/// the response was withheld by a cross-origin policy.
const CROSS_ORIGIN_SIGNATURES: [&str; 4] = [
    "cors",
    "cross-origin",
    "failed to fetch",
    "networkerror when attempting to fetch",
];

/// A function call issued by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The answer to one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        self.response["success"].as_bool().unwrap_or(false)
    }

    /// The `errorKind` of a failed response.
    pub fn error_kind(&self) -> Option<&str> {
        self.response["errorKind"].as_str()
    }

    fn success(call: &ToolCall, output: ExecutionOutput) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({
                "success": true,
                "data": output.data,
                "summary": output.summary,
            }),
        }
    }

    fn failure(call: &ToolCall, error: &ToolError) -> Self {
        let message = match error {
            ToolError::ToolNotFound(name) => format!("Tool '{}' is not available", name),
            ToolError::ToolExecutionFailed(reason) => reason.clone(),
        };
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({
                "success": false,
                "error": message,
                "errorKind": error.kind(),
            }),
        }
    }

    fn cross_origin(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({
                "success": true,
                "corsBlocked": true,
                "note": "The request was sent but the response could not be read. \
                         The action most likely went through.",
            }),
        }
    }
}

/// Whether a network-layer failure message looks like a cross-origin block.
pub fn is_cross_origin_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    CROSS_ORIGIN_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    executor: Arc<dyn IntegrationExecutor>,
    timeout: Duration,
    origin: DocumentOrigin,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, executor: Arc<dyn IntegrationExecutor>) -> Self {
        Self {
            registry,
            executor,
            timeout: DEFAULT_TOOL_TIMEOUT,
            origin: DocumentOrigin::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Session and contact stamped on generated documents.
    pub fn with_origin(mut self, origin: DocumentOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Runs one call and returns its response. Never fails: every error is
    /// folded into the response payload.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResponse {
        let Some(tool) = self.registry.resolve(&call.name) else {
            warn!(call_id = %call.id, tool = %call.name, "model called an unknown tool");
            return ToolResponse::failure(call, &ToolError::ToolNotFound(call.name.clone()));
        };

        info!(
            call_id = %call.id,
            tool = %call.name,
            integration = %tool.instance.integration_id,
            "dispatching tool call"
        );

        let outcome = if tool.instance.integration_id == DOCUMENT_INTEGRATION_ID {
            Ok(generate_document(&call.args, &self.origin))
        } else {
            tokio::time::timeout(
                self.timeout,
                self.executor.execute(&tool.instance, call.args.clone()),
            )
            .await
        };

        let failure = |reason: String| {
            warn!(call_id = %call.id, tool = %call.name, reason = %reason, "tool call failed");
            ToolResponse::failure(call, &ToolError::ToolExecutionFailed(reason))
        };

        match outcome {
            Err(_) => failure(format!(
                "timed out after {}s",
                self.timeout.as_secs_f64()
            )),
            Ok(Err(ExecutionError::Network(message))) if is_cross_origin_failure(&message) => {
                info!(
                    call_id = %call.id,
                    tool = %call.name,
                    "request likely delivered but response blocked"
                );
                ToolResponse::cross_origin(call)
            }
            Ok(Err(err)) => failure(err.to_string()),
            Ok(Ok(output)) if !output.success => failure(
                output
                    .error
                    .unwrap_or_else(|| "integration reported failure".to_string()),
            ),
            Ok(Ok(output)) => {
                info!(call_id = %call.id, tool = %call.name, "tool call succeeded");
                ToolResponse::success(call, output)
            }
        }
    }

    /// Runs every call concurrently. Responses come back in request order.
    pub async fn dispatch_batch(&self, calls: &[ToolCall]) -> Vec<ToolResponse> {
        join_all(calls.iter().map(|call| self.dispatch(call))).await
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.registry.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
