use crate::error::TransportError;
use crate::protocol::{ClientMessage, ServerMessage, SessionSetup};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Something the transport observed on the live connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// The remote side closed the connection cleanly.
    Closed { reason: Option<String> },
    /// The connection broke.
    Error(TransportError),
}

/// A bidirectional connection to the live endpoint.
///
/// `open` sends `setup` and returns the inbound event stream; the session
/// waits on that stream for the setup acknowledgement. A transport serves one
/// connection at a time and may be reopened after `close`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        setup: SessionSetup,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    /// Closes the current connection. Idempotent.
    async fn close(&self);
}
