//! Transport abstraction over the room coordination connection.
//!
//! The sync layer talks to the service through the [`Transport`] and
//! [`Connector`] traits instead of a concrete WebSocket stream, so the whole
//! client can be driven in tests with in-memory channel transports. The
//! production implementation lives in [`websocket`].

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
pub mod testing;
pub mod websocket;

pub use websocket::WebSocketConnector;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection handshake failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Sending a frame failed
    #[error("send failed: {0}")]
    Send(String),

    /// Receiving a frame failed
    #[error("receive failed: {0}")]
    Receive(String),
}

/// A connected, bidirectional text-frame transport.
///
/// The coordination protocol is JSON over text frames; binary frames are not
/// part of the contract and implementations drop them.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// # Returns
    ///
    /// * `Some(Ok(text))` - a frame arrived
    /// * `Some(Err(e))` - the transport failed (triggers reconnection)
    /// * `None` - the peer closed the connection cleanly (no reconnection)
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the transport deliberately
    async fn close(&mut self);
}

pub type BoxedTransport = Box<dyn Transport>;

/// Factory for [`Transport`] instances.
///
/// One logical connection may go through several transports over its lifetime
/// (initial connect plus reconnection attempts), so the connection manager
/// holds a connector rather than a transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a new transport to `endpoint`, authenticating with `token`.
    async fn connect(&self, endpoint: &str, token: &str) -> Result<BoxedTransport, TransportError>;
}
