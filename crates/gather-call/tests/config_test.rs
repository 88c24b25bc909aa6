use gather_call::{apply_env_overrides, load_config, Config, ConfigError};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_defaults_without_file() {
    let config = load_config(Some("/nonexistent/gather.toml")).unwrap();
    let defaults = Config::default();
    assert_eq!(config.endpoint.model, defaults.endpoint.model);
    assert_eq!(config.tools.timeout_secs, 30);
    assert_eq!(config.tools.rdap_url, "https://rdap.org/domain/");
    assert_eq!(config.session.max_call_secs, 7200);
    assert_eq!(config.audio.frame_size, 4096);
}

#[test]
fn test_partial_file_keeps_section_defaults() {
    let file = write_config(
        r#"
[endpoint]
url = "ws://localhost:9000/live"
api_key = "k-123"

[tools]
timeout_secs = 5

[logging]
json = true
"#,
    );
    let config = load_config(file.path().to_str()).unwrap();

    assert_eq!(config.endpoint.url, "ws://localhost:9000/live");
    assert_eq!(config.endpoint.model, "models/gemini-2.0-flash-live-001");
    assert_eq!(config.tool_timeout(), Duration::from_secs(5));
    assert_eq!(config.session.connect_timeout_secs, 15);
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.json);
    assert!(config.audio.echo_cancellation);
}

#[test]
fn test_invalid_file_is_parse_error() {
    let file = write_config("[tools]\ntimeout_secs = \"soon\"\n");
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_env_overrides() {
    let mut config = Config::default();
    apply_env_overrides(
        &mut config,
        env(&[
            ("GATHER_ENDPOINT_URL", "ws://override/live"),
            ("GATHER_MODEL", "models/other"),
            ("GATHER_API_KEY", "from-env"),
            ("GATHER_TOOL_TIMEOUT_SECS", "12"),
            ("GATHER_RDAP_URL", "http://rdap.internal/domain/"),
            ("GATHER_LOG_LEVEL", "debug"),
            ("GATHER_LOG_JSON", "1"),
        ]),
    );

    assert_eq!(config.endpoint.url, "ws://override/live");
    assert_eq!(config.endpoint.model, "models/other");
    assert_eq!(config.endpoint.api_key.as_deref(), Some("from-env"));
    assert_eq!(config.tools.timeout_secs, 12);
    assert_eq!(config.tools.rdap_url, "http://rdap.internal/domain/");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_unparseable_env_values_are_ignored() {
    let mut config = Config::default();
    apply_env_overrides(
        &mut config,
        env(&[("GATHER_TOOL_TIMEOUT_SECS", "abc"), ("GATHER_LOG_JSON", "yes")]),
    );
    assert_eq!(config.tools.timeout_secs, 30);
    assert!(!config.logging.json);
}

#[test]
fn test_endpoint_url_carries_key_and_debug_hides_it() {
    let mut config = Config::default();
    config.endpoint.url = "ws://localhost/live".to_string();
    assert_eq!(config.endpoint_url(), "ws://localhost/live");

    config.endpoint.api_key = Some("s3cret".to_string());
    assert_eq!(config.endpoint_url(), "ws://localhost/live?key=s3cret");

    config.endpoint.url = "ws://localhost/live?alt=json".to_string();
    assert_eq!(config.endpoint_url(), "ws://localhost/live?alt=json&key=s3cret");

    assert!(!format!("{:?}", config).contains("s3cret"));
}

#[test]
fn test_session_config_mapping() {
    let mut config = Config::default();
    config.endpoint.model = "models/m".to_string();
    config.session.connect_timeout_secs = 3;
    config.session.max_call_secs = 60;
    config.tools.timeout_secs = 7;

    let session = config.session_config();
    assert_eq!(session.model, "models/m");
    assert_eq!(session.connect_timeout, Duration::from_secs(3));
    assert_eq!(session.max_call_duration, Duration::from_secs(60));
    assert_eq!(session.tool_timeout, Duration::from_secs(7));
}
