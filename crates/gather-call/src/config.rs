//! Client configuration loading from file and environment variables.

use gather_audio::{CaptureConstraints, DEFAULT_FRAME_SIZE};
use gather_session::{SessionConfig, DEFAULT_MODEL};
use gather_tools::DEFAULT_RDAP_BASE;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Realtime endpoint used when none is configured.
pub const DEFAULT_ENDPOINT_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Remote model endpoint.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Microphone settings.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Tool execution settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Call limits.
    #[serde(default)]
    pub session: SessionSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket URL of the realtime endpoint, without the key.
    #[serde(default = "default_endpoint_url")]
    pub url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Appended to the URL as the `key` query parameter.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Samples per uplink frame.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    #[serde(default = "default_true")]
    pub echo_cancellation: bool,

    #[serde(default = "default_true")]
    pub noise_suppression: bool,

    #[serde(default = "default_true")]
    pub auto_gain_control: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Per-call tool execution timeout.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    /// RDAP service used by the domain availability tool.
    #[serde(default = "default_rdap_url")]
    pub rdap_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Bound on connecting and receiving the setup acknowledgement.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Calls are ended after this long.
    #[serde(default = "default_max_call_secs")]
    pub max_call_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gather_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_frame_size() -> usize {
    DEFAULT_FRAME_SIZE
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_rdap_url() -> String {
    DEFAULT_RDAP_BASE.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_max_call_secs() -> u64 {
    2 * 60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frame_size: default_frame_size(),
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            rdap_url: default_rdap_url(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            max_call_secs: default_max_call_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Full endpoint URL, including the key when one is configured.
    pub fn endpoint_url(&self) -> String {
        match self.endpoint.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let separator = if self.endpoint.url.contains('?') { '&' } else { '?' };
                format!("{}{}key={}", self.endpoint.url, separator, key)
            }
            None => self.endpoint.url.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.endpoint.model.clone(),
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            tool_timeout: self.tool_timeout(),
            max_call_duration: Duration::from_secs(self.session.max_call_secs),
            ..SessionConfig::default()
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            echo_cancellation: self.audio.echo_cancellation,
            noise_suppression: self.audio.noise_suppression,
            auto_gain_control: self.audio.auto_gain_control,
            ..CaptureConstraints::default()
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies overrides from the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies environment overrides read through `lookup`.
///
/// - `GATHER_ENDPOINT_URL` overrides `endpoint.url`
/// - `GATHER_MODEL` overrides `endpoint.model`
/// - `GATHER_API_KEY` overrides `endpoint.api_key`
/// - `GATHER_TOOL_TIMEOUT_SECS` overrides `tools.timeout_secs`
/// - `GATHER_RDAP_URL` overrides `tools.rdap_url`
/// - `GATHER_LOG_LEVEL` overrides `logging.level`
/// - `GATHER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("GATHER_ENDPOINT_URL") {
        config.endpoint.url = url;
    }
    if let Some(model) = lookup("GATHER_MODEL") {
        config.endpoint.model = model;
    }
    if let Some(key) = lookup("GATHER_API_KEY") {
        config.endpoint.api_key = Some(key);
    }
    if let Some(timeout) = lookup("GATHER_TOOL_TIMEOUT_SECS") {
        if let Ok(parsed) = timeout.parse() {
            config.tools.timeout_secs = parsed;
        }
    }
    if let Some(rdap_url) = lookup("GATHER_RDAP_URL") {
        config.tools.rdap_url = rdap_url;
    }
    if let Some(level) = lookup("GATHER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("GATHER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
