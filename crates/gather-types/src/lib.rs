//! Shared types for the Gather voice engine.
//!
//! This crate holds the vocabulary every other Gather crate speaks: the
//! persona descriptor a call is started with, the integrations attached to
//! that persona, the call status state machine, and the telemetry events the
//! call UI listens to.
//!
//! It has no async or I/O dependencies so that UI layers and test doubles can
//! depend on it without pulling in the session runtime.

use serde::{Deserialize, Serialize};

mod event;
mod persona;

pub use event::CallEvent;
pub use persona::{IntegrationCategory, IntegrationInstance, Persona, DEFAULT_VOICE};

/// Top-level status of a voice call.
///
/// ```text
/// idle -> connecting -> connected -> ended
///             \             \
///              +-> error <---+
/// ```
///
/// `Error` and `Ended` are terminal for a session; a fresh `start` moves the
/// manager back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No call has been started yet.
    #[default]
    Idle,
    /// The microphone is being acquired and the transport is opening.
    Connecting,
    /// The transport acknowledged the session; audio is flowing.
    Connected,
    /// The call was ended locally or closed cleanly by the remote side.
    Ended,
    /// Startup failed or the transport broke mid-call.
    Error,
}

impl CallStatus {
    /// Returns the string label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ended => "ended",
            Self::Error => "error",
        }
    }

    /// Whether a session is currently live (`Connecting` or `Connected`).
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Whether the status ends a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = ParseCallStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "ended" => Ok(Self::Ended),
            "error" => Ok(Self::Error),
            _ => Err(ParseCallStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown call status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown call status: {0}")]
pub struct ParseCallStatusError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_status_round_trip() {
        for status in [
            CallStatus::Idle,
            CallStatus::Connecting,
            CallStatus::Connected,
            CallStatus::Ended,
            CallStatus::Error,
        ] {
            let parsed: CallStatus = status.label().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn call_status_invalid() {
        let err = "ringing".parse::<CallStatus>().unwrap_err();
        assert_eq!(err.0, "ringing");
    }

    #[test]
    fn call_status_predicates() {
        assert!(CallStatus::Connecting.is_live());
        assert!(CallStatus::Connected.is_live());
        assert!(!CallStatus::Idle.is_live());
        assert!(CallStatus::Ended.is_terminal());
        assert!(CallStatus::Error.is_terminal());
        assert!(!CallStatus::Connected.is_terminal());
    }

    #[test]
    fn call_status_serializes_snake_case() {
        let json = serde_json::to_string(&CallStatus::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }
}
