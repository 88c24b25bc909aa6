//! Built-in document generation tool.
//!
//! Every session exposes `generate_document`. The model writes the document
//! itself and passes it in as markdown; the call is answered locally, with no
//! integration behind it, and the finished document travels back in the
//! tool response.

use crate::catalog::ToolDefinition;
use crate::error::ExecutionError;
use crate::executor::ExecutionOutput;
use chrono::Utc;
use gather_types::IntegrationInstance;
use serde_json::{json, Value};
use uuid::Uuid;

pub const DOCUMENT_TOOL_NAME: &str = "generate_document";

/// Integration id bound to the built-in document tool.
pub const DOCUMENT_INTEGRATION_ID: &str = "generate-document";

/// Who a document was generated for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentOrigin {
    pub session_id: Option<String>,
    pub contact_name: Option<String>,
}

pub(crate) fn document_instance() -> IntegrationInstance {
    let mut instance =
        IntegrationInstance::action("builtin-generate-document", DOCUMENT_INTEGRATION_ID);
    instance.name = "Generate Document".to_string();
    instance
}

pub(crate) fn document_definition() -> ToolDefinition {
    ToolDefinition {
        name: DOCUMENT_TOOL_NAME.to_string(),
        description: "Generate a written document, essay, report, or any written content when \
                      the user asks for it. Use when the user says things like 'write me', \
                      'create a document', 'generate an essay' or 'draft a report'."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The complete document in well-formatted markdown"
                },
                "wordCount": {
                    "type": "number",
                    "description": "Target word count the user asked for, if any"
                }
            },
            "required": ["content"]
        }),
    }
}

/// Packages the model-written `content` as a markdown document.
///
/// # Errors
///
/// [`ExecutionError::InvalidArguments`] when `content` is missing or blank.
pub fn generate_document(
    args: &Value,
    origin: &DocumentOrigin,
) -> Result<ExecutionOutput, ExecutionError> {
    let content = args
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            ExecutionError::InvalidArguments(
                "no content provided for document generation".to_string(),
            )
        })?;

    let now = Utc::now();
    let words = content.split_whitespace().count();
    let suffix = Uuid::new_v4().simple().to_string();

    let document = json!({
        "id": format!("voice_doc_{}_{}", now.timestamp(), &suffix[..8]),
        "name": format!("Voice Generated Document {}", now.format("%Y-%m-%d %H:%M:%S")),
        "type": "text/markdown",
        "content": content,
        "size": content.len(),
        "summary": format!("Voice-generated document ({} words)", words),
        "metadata": {
            "source": "voice_call",
            "sessionId": origin.session_id,
            "contactName": origin.contact_name,
            "wordCount": words,
            "requestedWordCount": args
                .get("wordCount")
                .and_then(Value::as_f64)
                .map(|n| n.max(0.0) as u64),
            "generatedAt": now.to_rfc3339(),
        }
    });

    Ok(ExecutionOutput::ok(
        json!({
            "document": document,
            "message": "Document generated successfully",
        }),
        format!("Generated a {}-word document", words),
    ))
}
