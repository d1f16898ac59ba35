//! In-memory transports for driving the sync layer in unit tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::infrastructure::dto::websocket::ClientMessage;

use super::{BoxedTransport, Transport, TransportError};

/// Transport half backed by unbounded channels
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(text)
            .map_err(|_| TransportError::Send("peer gone".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {}
}

/// The coordinator's side of a [`ChannelTransport`]
pub struct PeerSide {
    outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl PeerSide {
    /// Next message sent by the client, decoded
    pub async fn next_message(&mut self) -> ClientMessage {
        let text = self.outbound_rx.recv().await.expect("client side closed");
        serde_json::from_str(&text).expect("invalid client message")
    }

    /// Push a raw JSON frame to the client
    pub fn push_raw(&self, text: &str) {
        self.inbound_tx
            .send(Ok(text.to_string()))
            .expect("client side closed");
    }

    /// Push a bare successful reply for `seq`
    pub fn push_reply(&self, seq: Uuid) {
        self.push_raw(&format!(
            r#"{{"type": "reply", "seq": "{seq}", "success": true}}"#
        ));
    }

    /// Simulate an unexpected transport failure
    pub fn fail(&self) {
        self.inbound_tx
            .send(Err(TransportError::Receive("reset by peer".to_string())))
            .expect("client side closed");
    }
}

/// A connected transport/peer pair
pub fn transport_pair() -> (BoxedTransport, PeerSide) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        Box::new(ChannelTransport {
            tx: outbound_tx,
            rx: inbound_rx,
        }),
        PeerSide {
            outbound_rx,
            inbound_tx,
        },
    )
}
