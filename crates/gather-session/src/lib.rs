//! Live voice session engine.
//!
//! [`SessionManager`] runs one call at a time against a live conversational
//! endpoint: microphone frames go up through a [`Transport`], synthesized
//! speech comes back into the playback queue, and model tool calls are
//! dispatched to integrations while the conversation continues.
//!
//! [`WebSocketTransport`] speaks the JSON protocol in [`protocol`] over a
//! WebSocket; tests substitute their own [`Transport`].

mod call_start;
mod error;
mod history;
pub mod protocol;
mod session;
mod transport;
mod ws;

pub use call_start::CALL_STARTED_ACTION;
pub use error::{SessionError, TransportError};
pub use history::ToolCallRecord;
pub use protocol::{ClientMessage, InboundSignal, ServerMessage, SessionSetup};
pub use session::{
    build_system_instruction, SessionConfig, SessionManager, DEFAULT_MODEL, VOICE_MODE_GUIDANCE,
};
pub use transport::{Transport, TransportEvent};
pub use ws::WebSocketTransport;
