//! Telemetry events emitted to the call UI.

use crate::CallStatus;
use serde::{Deserialize, Serialize};

/// Per-call telemetry.
///
/// Events are fire-and-forget: the session never waits on a listener, and a
/// lagging listener simply misses events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallEvent {
    // ── Lifecycle ────────────────────────────────────────────────────
    /// The call status changed.
    StatusChanged {
        /// The new status.
        status: CallStatus,
        /// Failure description when `status` is `error`.
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Periodic elapsed-time signal for the call timer.
    CallElapsed {
        /// Whole seconds since the transport acknowledged the session.
        seconds: u64,
    },

    /// The call ended.
    CallEnded {
        /// Whole seconds the call was connected.
        duration_secs: u64,
    },

    // ── Conversation ─────────────────────────────────────────────────
    /// The user barged in; pending speech was discarded.
    Interrupted {
        /// Number of queued chunks discarded by the flush.
        discarded_chunks: usize,
    },

    /// The model finished a turn.
    TurnComplete,

    // ── Tools ────────────────────────────────────────────────────────
    /// The model asked for a tool.
    ToolInvoked {
        call_id: String,
        tool_name: String,
    },

    /// A tool call finished and its result was relayed to the model.
    ToolCompleted {
        call_id: String,
        tool_name: String,
        success: bool,
    },

    // ── Transport ────────────────────────────────────────────────────
    /// The remote endpoint announced an upcoming disconnect.
    GoAway {
        /// Remaining time as reported by the endpoint, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        time_left: Option<String>,
    },
}

impl CallEvent {
    /// Returns the canonical event type string for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "STATUS_CHANGED",
            Self::CallElapsed { .. } => "CALL_ELAPSED",
            Self::CallEnded { .. } => "CALL_ENDED",
            Self::Interrupted { .. } => "INTERRUPTED",
            Self::TurnComplete => "TURN_COMPLETE",
            Self::ToolInvoked { .. } => "TOOL_INVOKED",
            Self::ToolCompleted { .. } => "TOOL_COMPLETED",
            Self::GoAway { .. } => "GO_AWAY",
        }
    }
}
