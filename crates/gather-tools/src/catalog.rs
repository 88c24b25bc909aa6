//! Tool definitions for known integrations.

use gather_types::IntegrationInstance;
use serde_json::{json, Value};

/// What the model is told about one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Preferred tool name. The registry may sanitize or suffix it.
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the arguments.
    pub parameters: Value,
}

/// Maps an integration instance to the tool it exposes.
pub trait IntegrationCatalog: Send + Sync {
    fn describe(&self, instance: &IntegrationInstance) -> ToolDefinition;
}

/// Definitions for the integrations Gather ships with.
///
/// Unknown integration ids get a generic definition built from the instance's
/// own name and description, taking a single free-form `input` argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl IntegrationCatalog for BuiltinCatalog {
    fn describe(&self, instance: &IntegrationInstance) -> ToolDefinition {
        match instance.integration_id.as_str() {
            "api-request-tool" => ToolDefinition {
                name: "make_api_request".to_string(),
                description: "Make an HTTP API request to fetch data from external services"
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The URL to make the request to"
                        },
                        "method": {
                            "type": "string",
                            "description": "HTTP method (GET, POST, PUT, DELETE)",
                            "enum": ["GET", "POST", "PUT", "DELETE"]
                        },
                        "headers": {
                            "type": "object",
                            "description": "HTTP headers as key-value pairs"
                        },
                        "body": {
                            "type": "string",
                            "description": "Request body for POST/PUT requests"
                        }
                    },
                    "required": ["url"]
                }),
            },
            "domain-checker-tool" => ToolDefinition {
                name: "check_domain_availability".to_string(),
                description: "Check domain availability using RDAP with customizable variations"
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "domain": {
                            "type": "string",
                            "description": "Base domain name to check (without TLD)"
                        },
                        "variations": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Optional domain variations to check. Use {domain} as placeholder."
                        }
                    },
                    "required": ["domain"]
                }),
            },
            "webhook-trigger" => ToolDefinition {
                name: "trigger_webhook".to_string(),
                description: "Trigger a webhook based on natural language commands. Use when the \
                              user asks to activate, trigger, start, launch, or execute something."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "description": "The action the user wants to perform (e.g. 'send notification')"
                        }
                    },
                    "required": ["action"]
                }),
            },
            "web-search" => ToolDefinition {
                name: "search_web".to_string(),
                description: "Search the web for current information, news, facts, or real-time \
                              data."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to search for on the web"
                        },
                        "searchDepth": {
                            "type": "string",
                            "enum": ["basic", "advanced"]
                        },
                        "maxResults": {
                            "type": "number",
                            "description": "Maximum number of results to return (1-20)"
                        }
                    },
                    "required": ["query"]
                }),
            },
            "firecrawl" => ToolDefinition {
                name: "scrape_website".to_string(),
                description: "Extract content from a website when the user asks to scrape, crawl, \
                              or read a specific URL."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The URL to scrape content from"
                        },
                        "extractType": {
                            "type": "string",
                            "enum": ["text", "markdown", "html", "screenshot"]
                        },
                        "includeImages": { "type": "boolean" },
                        "maxPages": { "type": "number" }
                    },
                    "required": ["url"]
                }),
            },
            _ => generic_definition(instance),
        }
    }
}

fn generic_definition(instance: &IntegrationInstance) -> ToolDefinition {
    let label = if instance.name.trim().is_empty() {
        instance.integration_id.as_str()
    } else {
        instance.name.trim()
    };
    let description = if instance.description.trim().is_empty() {
        format!("Run the {} integration", label)
    } else {
        instance.description.trim().to_string()
    };

    ToolDefinition {
        name: label
            .to_lowercase()
            .replace(|c: char| c == ' ' || c == '-', "_"),
        description,
        parameters: json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "What the integration should do, in plain language"
                }
            },
            "required": ["input"]
        }),
    }
}
