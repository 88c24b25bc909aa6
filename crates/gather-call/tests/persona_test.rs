use gather_call::{load_persona, PersonaError};
use std::io::Write;

fn write_persona(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_persona_file() {
    let file = write_persona(
        r#"{
            "id": "p-1",
            "name": "Ava",
            "description": "a booking assistant",
            "voice": "Kore",
            "integrations": [
                {"id": "w-1", "integrationId": "webhook-trigger",
                 "runOnCallStart": true,
                 "config": {"webhookUrl": "https://example.com/hook"}}
            ]
        }"#,
    );
    let persona = load_persona(file.path()).unwrap();

    assert_eq!(persona.name, "Ava");
    assert_eq!(persona.voice, "Kore");
    assert_eq!(persona.call_start_integrations().count(), 1);
}

#[test]
fn test_missing_persona_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_persona(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, PersonaError::Read(_)));
}

#[test]
fn test_malformed_persona_is_parse_error() {
    let file = write_persona("{\"id\": \"p-1\",");
    assert!(matches!(
        load_persona(file.path()).unwrap_err(),
        PersonaError::Parse(_)
    ));
}

#[test]
fn test_blank_name_is_rejected() {
    let file = write_persona(r#"{"id": "p-1", "name": "  "}"#);
    assert!(matches!(
        load_persona(file.path()).unwrap_err(),
        PersonaError::Invalid(_)
    ));
}
