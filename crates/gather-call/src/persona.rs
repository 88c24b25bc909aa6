//! Persona files.

use gather_types::Persona;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("failed to read persona file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse persona file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid persona: {0}")]
    Invalid(String),
}

/// Reads a persona from a JSON file.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, or when the persona has no
/// id or name.
pub fn load_persona(path: impl AsRef<Path>) -> Result<Persona, PersonaError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let persona: Persona = serde_json::from_str(&contents)?;
    if persona.id.trim().is_empty() {
        return Err(PersonaError::Invalid("id is empty".to_string()));
    }
    if persona.name.trim().is_empty() {
        return Err(PersonaError::Invalid("name is empty".to_string()));
    }
    tracing::debug!(
        persona_id = %persona.id,
        integrations = persona.integrations.len(),
        "persona loaded"
    );
    Ok(persona)
}
