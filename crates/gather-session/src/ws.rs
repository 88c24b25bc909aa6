//! WebSocket transport.

use crate::error::TransportError;
use crate::protocol::{ClientMessage, ServerMessage, SessionSetup};
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Capacity of the inbound event channel.
const EVENT_BUFFER: usize = 256;

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

/// [`Transport`] over a single WebSocket connection.
pub struct WebSocketTransport {
    url: String,
    connection: Mutex<Option<Connection>>,
}

impl WebSocketTransport {
    /// `url` is the full endpoint URL, including any key query parameter.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: Mutex::new(None),
        }
    }

    /// The endpoint URL without its query string, safe to log.
    pub fn redacted_url(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.redacted_url())
            .finish()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        setup: SessionSetup,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.close().await;

        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(url = %self.redacted_url(), "websocket connected");

        let (mut sink, mut stream) = socket.split();

        let setup_json = ClientMessage::Setup(setup)
            .to_json()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        sink.send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "websocket writer stopped");
                    return;
                }
            }
            // Sender dropped by close(): say goodbye properly.
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let parsed = match frame {
                    Ok(Message::Text(text)) => ServerMessage::parse(text.as_str()),
                    Ok(Message::Binary(bytes)) => ServerMessage::parse_bytes(&bytes),
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty());
                        let _ = events_tx.send(TransportEvent::Closed { reason }).await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = events_tx
                            .send(TransportEvent::Error(TransportError::Protocol(e.to_string())))
                            .await;
                        return;
                    }
                };
                match parsed {
                    Ok(message) => {
                        if events_tx.send(TransportEvent::Message(message)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping unparseable server message"),
                }
            }
            let _ = events_tx.send(TransportEvent::Closed { reason: None }).await;
        });

        *self.connection.lock().await = Some(Connection {
            outbound: outbound_tx,
            reader,
        });
        Ok(events_rx)
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let json = message
            .to_json()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or(TransportError::Closed)?;
        connection
            .outbound
            .send(Message::Text(json.into()))
            .map_err(|_| TransportError::Send("websocket writer has stopped".to_string()))
    }

    async fn close(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            connection.reader.abort();
            drop(connection.outbound);
            info!(url = %self.redacted_url(), "websocket closed");
        }
    }
}
