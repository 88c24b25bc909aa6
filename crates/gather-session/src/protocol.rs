//! Live endpoint wire protocol.
//!
//! JSON messages exchanged with a `BidiGenerateContent` style endpoint.
//! Outbound messages are a single-key object (`setup`, `realtimeInput`,
//! `clientContent`, `toolResponse`). Inbound messages may carry several
//! top-level keys at once; [`ServerMessage::into_signals`] flattens them into
//! the order the session must handle them in.

use gather_audio::{SpeechChunk, INPUT_MIME_TYPE, OUTPUT_SAMPLE_RATE};
use gather_tools::{ToolCall, ToolRegistry, ToolResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Response modality requested from the endpoint.
pub const RESPONSE_MODALITY_AUDIO: &str = "AUDIO";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SessionSetup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponseBatch),
}

impl ClientMessage {
    /// One base64 PCM16 microphone frame.
    pub fn audio(data: impl Into<String>) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                data: data.into(),
                mime_type: INPUT_MIME_TYPE.to_string(),
            },
        })
    }

    /// A complete user text turn.
    pub fn text(text: impl Into<String>) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::user(text)],
            turn_complete: true,
        })
    }

    /// Answers to one tool-call batch.
    pub fn tool_responses(responses: Vec<ToolResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponseBatch {
            function_responses: responses,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
}

impl SessionSetup {
    pub fn new(
        model: impl Into<String>,
        voice: impl Into<String>,
        instruction: impl Into<String>,
        registry: &ToolRegistry,
    ) -> Self {
        let declarations: Vec<FunctionDeclaration> = registry
            .tools()
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect();
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: declarations,
            }]
        };

        Self {
            model: model.into(),
            generation_config: GenerationConfig {
                response_modalities: vec![RESPONSE_MODALITY_AUDIO.to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.into(),
                        },
                    },
                },
            },
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(instruction)],
            },
            tools,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseBatch {
    pub function_responses: Vec<ToolResponse>,
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Any message received from the endpoint. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCallBatch>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub generation_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBatch {
    #[serde(default)]
    pub function_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time, e.g. `"10s"`.
    #[serde(default)]
    pub time_left: Option<Value>,
}

/// One thing the session has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundSignal {
    SetupComplete,
    ToolCalls(Vec<ToolCall>),
    ToolCallsCancelled(Vec<String>),
    Interrupted,
    Audio(SpeechChunk),
    Text(String),
    TurnComplete,
    GenerationComplete,
    GoAway(Option<String>),
}

impl ServerMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn parse_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flattens the message into signals.
    ///
    /// Within server content the interruption comes first, so stale speech is
    /// flushed before anything in the same message is enqueued, and turn
    /// completion comes last.
    pub fn into_signals(self) -> Vec<InboundSignal> {
        let mut signals = Vec::new();

        if self.setup_complete.is_some() {
            signals.push(InboundSignal::SetupComplete);
        }
        if let Some(cancellation) = self.tool_call_cancellation {
            if !cancellation.ids.is_empty() {
                signals.push(InboundSignal::ToolCallsCancelled(cancellation.ids));
            }
        }
        if let Some(batch) = self.tool_call {
            if !batch.function_calls.is_empty() {
                signals.push(InboundSignal::ToolCalls(batch.function_calls));
            }
        }
        if let Some(content) = self.server_content {
            if content.interrupted {
                signals.push(InboundSignal::Interrupted);
            }
            for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
                if let Some(blob) = part.inline_data {
                    if blob.mime_type.starts_with("audio/") {
                        signals.push(InboundSignal::Audio(SpeechChunk {
                            sample_rate: sample_rate_from_mime(&blob.mime_type)
                                .unwrap_or(OUTPUT_SAMPLE_RATE),
                            data: blob.data,
                        }));
                    } else {
                        debug!(mime_type = %blob.mime_type, "ignoring non-audio inline data");
                    }
                }
                if let Some(text) = part.text {
                    signals.push(InboundSignal::Text(text));
                }
            }
            if content.turn_complete {
                signals.push(InboundSignal::TurnComplete);
            }
            if content.generation_complete {
                signals.push(InboundSignal::GenerationComplete);
            }
        }
        if let Some(go_away) = self.go_away {
            let time_left = go_away.time_left.map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            });
            signals.push(InboundSignal::GoAway(time_left));
        }

        signals
    }
}

/// Reads the `rate=` parameter of an audio MIME type.
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gather_tools::BuiltinCatalog;
    use gather_types::IntegrationInstance;
    use serde_json::json;

    #[test]
    fn setup_message_shape() {
        let registry = ToolRegistry::build(
            &[IntegrationInstance::action("w-1", "webhook-trigger")],
            &BuiltinCatalog,
        );
        let setup = SessionSetup::new("models/live", "Puck", "Be brief.", &registry);
        let value = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();

        assert_eq!(value["setup"]["model"], "models/live");
        assert_eq!(
            value["setup"]["generationConfig"]["responseModalities"],
            json!(["AUDIO"])
        );
        assert_eq!(
            value["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(
            value["setup"]["systemInstruction"],
            json!({ "parts": [{ "text": "Be brief." }] })
        );
        assert_eq!(
            value["setup"]["tools"][0]["functionDeclarations"][1]["name"],
            "trigger_webhook"
        );
    }

    #[test]
    fn setup_without_tools_omits_tools_key() {
        let registry = ToolRegistry::default();
        let setup = SessionSetup::new("m", "Puck", "hi", &registry);
        let value = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();
        assert!(value["setup"].get("tools").is_none());
    }

    #[test]
    fn outbound_message_shapes() {
        assert_eq!(
            serde_json::to_value(ClientMessage::audio("AAA=")).unwrap(),
            json!({ "realtimeInput": { "audio": { "data": "AAA=", "mimeType": "audio/pcm;rate=16000" } } })
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::text("hello")).unwrap(),
            json!({ "clientContent": { "turns": [{ "role": "user", "parts": [{ "text": "hello" }] }], "turnComplete": true } })
        );
        let response = ToolResponse {
            id: "c1".into(),
            name: "trigger_webhook".into(),
            response: json!({ "success": true }),
        };
        assert_eq!(
            serde_json::to_value(ClientMessage::tool_responses(vec![response])).unwrap(),
            json!({ "toolResponse": { "functionResponses": [
                { "id": "c1", "name": "trigger_webhook", "response": { "success": true } }
            ] } })
        );
    }

    #[test]
    fn server_content_signals_are_ordered() {
        let message = ServerMessage::parse(
            r#"{"serverContent":{"interrupted":true,"modelTurn":{"parts":[
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAA="}},
                {"text":"hi"}
            ]},"turnComplete":true}}"#,
        )
        .unwrap();

        assert_eq!(
            message.into_signals(),
            vec![
                InboundSignal::Interrupted,
                InboundSignal::Audio(SpeechChunk {
                    data: "AAA=".into(),
                    sample_rate: 24_000
                }),
                InboundSignal::Text("hi".into()),
                InboundSignal::TurnComplete,
            ]
        );
    }

    #[test]
    fn tool_messages_parse() {
        let message = ServerMessage::parse(
            r#"{"toolCall":{"functionCalls":[{"id":"c1","name":"trigger_webhook","args":{"action":"go"}}]}}"#,
        )
        .unwrap();
        match message.into_signals().as_slice() {
            [InboundSignal::ToolCalls(calls)] => {
                assert_eq!(calls[0].id, "c1");
                assert_eq!(calls[0].args["action"], "go");
            }
            other => panic!("unexpected signals: {:?}", other),
        }

        let message = ServerMessage::parse(r#"{"toolCallCancellation":{"ids":["c1","c2"]}}"#).unwrap();
        assert_eq!(
            message.into_signals(),
            vec![InboundSignal::ToolCallsCancelled(vec!["c1".into(), "c2".into()])]
        );
    }

    #[test]
    fn setup_complete_and_go_away() {
        let message = ServerMessage::parse_bytes(br#"{"setupComplete":{}}"#).unwrap();
        assert!(message.is_setup_complete());

        let message = ServerMessage::parse(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
        assert_eq!(
            message.into_signals(),
            vec![InboundSignal::GoAway(Some("10s".into()))]
        );
    }

    #[test]
    fn mime_rate_parsing() {
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(sample_rate_from_mime("audio/pcm; RATE = 16000"), Some(16_000));
        assert_eq!(sample_rate_from_mime("audio/pcm"), None);
    }
}
