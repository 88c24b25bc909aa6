//! Tool support for Gather voice calls.
//!
//! A persona's action integrations are exposed to the model as tools. The
//! [`ToolRegistry`] names them and maps names back to instances, the
//! [`ToolDispatcher`] runs model-issued calls through an
//! [`IntegrationExecutor`] and shapes the responses, and
//! [`HttpIntegrationExecutor`] covers the integrations that are plain HTTP.
//! Every session also gets the built-in `generate_document` tool, which is
//! answered without an executor.

mod catalog;
mod dispatch;
mod document;
mod error;
mod executor;
mod http;
mod registry;

pub use catalog::{BuiltinCatalog, IntegrationCatalog, ToolDefinition};
pub use dispatch::{
    is_cross_origin_failure, ToolCall, ToolDispatcher, ToolResponse, DEFAULT_TOOL_TIMEOUT,
};
pub use document::{generate_document, DocumentOrigin, DOCUMENT_INTEGRATION_ID, DOCUMENT_TOOL_NAME};
pub use error::{ExecutionError, ToolError};
pub use executor::{ExecutionOutput, IntegrationExecutor};
pub use http::{HttpIntegrationExecutor, DEFAULT_RDAP_BASE};
pub use registry::{sanitize_tool_name, RegisteredTool, ToolRegistry, MAX_TOOL_NAME_LEN};
