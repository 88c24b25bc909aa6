//! Persona and integration definitions.
//!
//! A `Persona` is the immutable snapshot of the agent being called. It is
//! supplied by the caller when a call starts and is never mutated during the
//! call; changing a persona requires a new session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prebuilt voice used when a persona does not pick one.
pub const DEFAULT_VOICE: &str = "Puck";

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_enabled() -> bool {
    true
}

/// Whether an integration feeds data into the conversation or performs actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationCategory {
    /// Passive data source. Never exposed to the model as a tool.
    Source,
    /// Action-capable integration. Exposed to the model as a tool.
    #[default]
    Action,
}

/// An integration enabled on a persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationInstance {
    /// Unique id of this configured instance.
    pub id: String,
    /// Catalog id of the integration type (e.g. `webhook-trigger`).
    pub integration_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-text description supplied by the persona's owner.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: IntegrationCategory,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Execute once, fire-and-forget, when a call connects.
    #[serde(default)]
    pub run_on_call_start: bool,
    /// Integration-specific settings (URLs, headers, ...). Opaque to the engine.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl IntegrationInstance {
    /// Creates an enabled action integration with an empty config.
    pub fn action(id: impl Into<String>, integration_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            integration_id: integration_id.into(),
            name: String::new(),
            description: String::new(),
            category: IntegrationCategory::Action,
            enabled: true,
            run_on_call_start: false,
            config: Map::new(),
        }
    }

    /// Creates an enabled source integration with an empty config.
    pub fn source(id: impl Into<String>, integration_id: impl Into<String>) -> Self {
        Self {
            category: IntegrationCategory::Source,
            ..Self::action(id, integration_id)
        }
    }

    /// Whether this instance becomes a tool for the model.
    pub fn is_tool(&self) -> bool {
        self.enabled && self.category == IntegrationCategory::Action
    }

    /// Looks up a string setting in `config`.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Immutable descriptor of the persona being called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description, used when `instructions` is empty.
    #[serde(default)]
    pub description: String,
    /// Prebuilt voice name understood by the remote endpoint.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Behavioral instructions for the model.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub integrations: Vec<IntegrationInstance>,
}

impl Persona {
    /// Creates a persona with the default voice and no integrations.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            voice: default_voice(),
            instructions: String::new(),
            integrations: Vec::new(),
        }
    }

    /// Integrations that become tools: enabled and action-capable.
    pub fn tool_integrations(&self) -> impl Iterator<Item = &IntegrationInstance> {
        self.integrations.iter().filter(|i| i.is_tool())
    }

    /// Enabled integrations flagged to run when the call connects.
    pub fn call_start_integrations(&self) -> impl Iterator<Item = &IntegrationInstance> {
        self.integrations
            .iter()
            .filter(|i| i.enabled && i.run_on_call_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_deserializes_with_defaults() {
        let persona: Persona = serde_json::from_str(
            r#"{
                "id": "p1",
                "name": "Ada",
                "integrations": [
                    {"id": "i1", "integrationId": "webhook-trigger",
                     "config": {"webhookUrl": "https://example.com/hook"}},
                    {"id": "i2", "integrationId": "rss-feed", "category": "source"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(persona.voice, DEFAULT_VOICE);
        assert!(persona.instructions.is_empty());
        assert_eq!(persona.integrations.len(), 2);
        assert!(persona.integrations[0].enabled);
        assert_eq!(
            persona.integrations[0].config_str("webhookUrl"),
            Some("https://example.com/hook")
        );
        assert_eq!(persona.integrations[1].category, IntegrationCategory::Source);
    }

    #[test]
    fn only_enabled_actions_become_tools() {
        let mut persona = Persona::new("p1", "Ada");
        let mut disabled = IntegrationInstance::action("i3", "api-request-tool");
        disabled.enabled = false;
        persona.integrations = vec![
            IntegrationInstance::action("i1", "webhook-trigger"),
            IntegrationInstance::source("i2", "rss-feed"),
            disabled,
        ];

        let ids: Vec<&str> = persona.tool_integrations().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i1"]);
    }

    #[test]
    fn call_start_integrations_include_sources() {
        let mut persona = Persona::new("p1", "Ada");
        let mut feed = IntegrationInstance::source("i2", "rss-feed");
        feed.run_on_call_start = true;
        persona.integrations = vec![IntegrationInstance::action("i1", "webhook-trigger"), feed];

        let ids: Vec<&str> = persona
            .call_start_integrations()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["i2"]);
    }
}
