//! Per-session tool registry.
//!
//! Tool names are what the model sees and sends back; instance ids are what
//! the executor needs. The registry keeps both directions explicitly so a
//! name never has to be parsed to find its integration.

use crate::catalog::{IntegrationCatalog, ToolDefinition};
use crate::document::{document_definition, document_instance};
use gather_types::IntegrationInstance;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Maximum tool name length accepted by the endpoint.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// A tool exposed to the model for the lifetime of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub instance: IntegrationInstance,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
    by_instance: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Builds the registry from a persona's integrations.
    ///
    /// `generate_document` is always registered first. Disabled and source
    /// integrations are skipped. Names are sanitized and, when two tools want
    /// the same name, suffixed `_2`, `_3`, ... in integration order.
    pub fn build<'a>(
        integrations: impl IntoIterator<Item = &'a IntegrationInstance>,
        catalog: &dyn IntegrationCatalog,
    ) -> Self {
        let mut registry = Self::default();
        registry.register(document_instance(), document_definition());

        for instance in integrations {
            if !instance.is_tool() {
                continue;
            }
            if registry.by_instance.contains_key(&instance.id) {
                debug!(instance_id = %instance.id, "duplicate integration instance skipped");
                continue;
            }
            registry.register(instance.clone(), catalog.describe(instance));
        }

        registry
    }

    fn register(&mut self, instance: IntegrationInstance, definition: ToolDefinition) {
        let name = self.unique_name(&sanitize_tool_name(&definition.name));
        let index = self.tools.len();
        self.by_name.insert(name.clone(), index);
        self.by_instance.insert(instance.id.clone(), index);
        self.tools.push(RegisteredTool {
            name,
            description: definition.description,
            parameters: definition.parameters,
            instance,
        });
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.by_name.contains_key(base) {
            return base.to_string();
        }
        let mut n = 2usize;
        loop {
            let suffix = format!("_{}", n);
            let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
            let candidate = format!("{}{}", &base[..keep], suffix);
            if !self.by_name.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Looks up a tool by the name the model used.
    pub fn resolve(&self, name: &str) -> Option<&RegisteredTool> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// The tool name assigned to an integration instance.
    pub fn name_for(&self, instance_id: &str) -> Option<&str> {
        self.by_instance
            .get(instance_id)
            .map(|&i| self.tools[i].name.as_str())
    }

    /// Registered tools in integration order.
    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The `Available tools:` block appended to the system instruction, or
    /// `None` for an empty registry.
    pub fn instruction_block(&self) -> Option<String> {
        if self.tools.is_empty() {
            return None;
        }
        let mut block = String::from("Available tools:");
        for tool in &self.tools {
            block.push_str("\n- ");
            block.push_str(&tool.name);
            block.push_str(": ");
            block.push_str(&tool.description);
        }
        Some(block)
    }
}

/// Coerces a raw name into `[A-Za-z0-9_-]{1,64}`.
///
/// Other characters become `_`. An empty result becomes `tool`.
pub fn sanitize_tool_name(raw: &str) -> String {
    let mut name: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect();
    if name.is_empty() {
        name.push_str("tool");
    }
    name
}
