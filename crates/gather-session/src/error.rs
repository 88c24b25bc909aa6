use gather_audio::AudioError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    /// The endpoint did not acknowledge the session setup.
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("microphone unavailable: {0}")]
    Device(#[from] AudioError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session is not connected")]
    NotConnected,

    /// `end()` was called before the connection was established.
    #[error("call ended while connecting")]
    Cancelled,
}
