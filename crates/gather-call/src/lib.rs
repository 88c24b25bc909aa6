//! Terminal voice client: configuration, persona files and device wiring for
//! a single call.

pub mod config;
pub mod persona;
pub mod speaker;

pub use config::{apply_env_overrides, load_config, Config, ConfigError};
pub use persona::{load_persona, PersonaError};
pub use speaker::SilentSpeaker;
