//! Per-session log of model tool calls.

use chrono::{DateTime, Utc};
use gather_tools::{ToolCall, ToolResponse};
use serde_json::Value;

/// One function call the model made, with the answer it got.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub response: Value,
    pub success: bool,
    /// The endpoint withdrew the call, so `response` was never sent.
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    pub(crate) fn new(call: &ToolCall, response: &ToolResponse, cancelled: bool) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.args.clone(),
            response: response.response.clone(),
            success: response.is_success(),
            cancelled,
            timestamp: Utc::now(),
        }
    }
}
