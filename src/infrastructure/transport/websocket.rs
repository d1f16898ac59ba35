//! WebSocket implementation of the transport traits.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{BoxedTransport, Connector, Transport, TransportError};

/// Transport backed by a tokio-tungstenite WebSocket stream
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring unexpected binary frame ({} bytes)", data.len());
                }
                Ok(Message::Close(_)) => return None,
                // Ping/Pong frames are answered by tungstenite itself
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

/// Connector that dials the room coordination service over WebSocket.
///
/// The identity token is appended as a query parameter at connect time and is
/// not retained here.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str, token: &str) -> Result<BoxedTransport, TransportError> {
        let url = if token.is_empty() {
            endpoint.to_string()
        } else {
            format!("{}?token={}", endpoint, token)
        };

        let (stream, response) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        tracing::debug!(
            "WebSocket handshake completed with status {}",
            response.status()
        );

        Ok(Box::new(WebSocketTransport { stream }))
    }
}
