//! WebSocket transport for the public feed
//!
//! Thin wrapper over tokio-tungstenite. The stream is owned by whoever runs
//! the receive loop; control frames are answered here so callers only ever
//! see text payloads.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::error::{FeedError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single established WebSocket connection
pub(crate) struct FeedTransport {
    stream: WsStream,
}

impl FeedTransport {
    /// Dial the endpoint and complete the WebSocket upgrade
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let (stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| FeedError::Connect(format!("{endpoint}: {e}")))?;

        debug!(status = ?response.status(), "WebSocket connected");
        Ok(Self { stream })
    }

    /// Receive the next text payload. Returns `Ok(None)` for control frames.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text frame");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                Ok(Some(String::from_utf8_lossy(&data).to_string()))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                let _ = self.stream.send(Message::Pong(data)).await;
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                Err(FeedError::Transport(
                    "connection closed by remote".to_string(),
                ))
            }
            Some(Err(e)) => Err(FeedError::Transport(e.to_string())),
            None => Err(FeedError::Transport("stream ended".to_string())),
        }
    }

    /// Send a text frame
    pub async fn send(&mut self, payload: String) -> Result<()> {
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(FeedError::from)
    }

    /// Close the connection, ignoring errors from an already-dead stream
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
