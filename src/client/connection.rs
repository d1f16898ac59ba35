//! Connection management for the room coordination service.
//!
//! Owns the single logical connection per client: connect, deliberate
//! disconnect, automatic reconnection with linear backoff, and the
//! correlation table that retrofits request/reply semantics onto the
//! push-event transport. Replies are matched to their request by correlation
//! id; everything else is forwarded to the event pump in strict delivery
//! order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::client::RoomClientConfig;
use crate::client::dispatcher::EventDispatcher;
use crate::client::error::RequestError;
use crate::domain::{ConnectionInfo, ConnectionState, RoomEvent};
use crate::infrastructure::dto::websocket::{
    ClientMessage, ERROR_CODE_FORCED_DISCONNECT, ErrorMessage, ReplyMessage, ServerMessage,
};
use crate::infrastructure::transport::{BoxedTransport, Connector, TransportError};

/// Reply wait window for correlated requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum automatic reconnection attempts after an unexpected closure
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Base delay between reconnection attempts; grows linearly with the attempt number
pub const RECONNECT_BASE_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on the per-attempt reconnection delay
pub const RECONNECT_MAX_INTERVAL: Duration = Duration::from_secs(5);

/// Frames queued from the client handle to the connection task
enum OutgoingFrame {
    Message(String),
    Close,
}

/// A request awaiting its correlated reply
struct PendingRequest {
    reply_tx: oneshot::Sender<ReplyMessage>,
    sent_at: Instant,
}

/// Why one transport session ended
enum SessionEnd {
    /// User-initiated close (or the client handle went away)
    Deliberate,
    /// The server closed the connection cleanly
    ServerClose,
    /// The transport failed unexpectedly
    Failed(TransportError),
}

/// State shared between the client handle and the connection task
struct ConnectionShared {
    info: Mutex<Arc<ConnectionInfo>>,
    pending: Mutex<HashMap<Uuid, PendingRequest>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<OutgoingFrame>>>,
    deliberate_close: AtomicBool,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    dispatcher: Arc<EventDispatcher>,
    request_timeout: Duration,
    max_reconnect_attempts: u32,
    reconnect_base_interval: Duration,
    reconnect_max_interval: Duration,
}

impl ConnectionShared {
    fn current(&self) -> Arc<ConnectionInfo> {
        Arc::clone(&self.info.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn state(&self) -> ConnectionState {
        self.current().state
    }

    /// Replace the connection view and fan out the state change
    fn transition(&self, next: ConnectionInfo) {
        let next = Arc::new(next);
        {
            let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
            *info = Arc::clone(&next);
        }
        self.dispatcher
            .emit(&RoomEvent::ConnectionStateChanged((*next).clone()));
    }

    /// Record the RTT of the most recent correlated reply.
    ///
    /// Latency is part of the connection view but not a state transition, so
    /// no event is emitted.
    fn set_latency(&self, latency_ms: u64) {
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        *info = Arc::new(ConnectionInfo {
            latency_ms: Some(latency_ms),
            ..(**info).clone()
        });
    }

    fn clear_outgoing(&self) {
        self.outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Drop all pending completions; their callers observe `ConnectionLost`
    fn fail_pending(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.is_empty() {
            tracing::debug!(
                "Rejecting {} in-flight request(s) after connection loss",
                pending.len()
            );
        }
        pending.clear();
    }

    /// Route one inbound frame: complete a pending request or forward a push
    fn handle_incoming(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Reply(reply)) => {
                let entry = self
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&reply.seq);
                match entry {
                    Some(request) => {
                        let rtt = request.sent_at.elapsed().as_millis() as u64;
                        self.set_latency(rtt);
                        if request.reply_tx.send(reply).is_err() {
                            tracing::debug!("Reply arrived for an abandoned request");
                        }
                    }
                    // First writer wins: the request already timed out or failed
                    None => {
                        tracing::debug!("Ignoring reply for unknown correlation id {}", reply.seq);
                    }
                }
            }
            Ok(message) => {
                if self.server_tx.send(message).is_err() {
                    tracing::warn!("Event pump is gone, dropping server message");
                }
            }
            Err(e) => {
                tracing::warn!("Failed to parse server message: {} — raw: {}", e, text);
            }
        }
    }
}

/// Manager of the single persistent connection to the room coordination
/// service.
///
/// Constructed once at client bootstrap; the room session controller and the
/// quiz flow coordinator hold it by reference. No other component opens a
/// second connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    shared: Arc<ConnectionShared>,
}

impl ConnectionManager {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        dispatcher: Arc<EventDispatcher>,
        config: &RoomClientConfig,
    ) -> Self {
        Self {
            connector,
            shared: Arc::new(ConnectionShared {
                info: Mutex::new(Arc::new(ConnectionInfo::disconnected())),
                pending: Mutex::new(HashMap::new()),
                outgoing: Mutex::new(None),
                deliberate_close: AtomicBool::new(false),
                server_tx,
                dispatcher,
                request_timeout: config.request_timeout,
                max_reconnect_attempts: config.max_reconnect_attempts,
                reconnect_base_interval: config.reconnect_base_interval,
                reconnect_max_interval: config.reconnect_max_interval,
            }),
        }
    }

    /// The current connection view
    pub fn info(&self) -> Arc<ConnectionInfo> {
        self.shared.current()
    }

    /// Establish the connection.
    ///
    /// Idempotent: while connecting, connected, or reconnecting this is a
    /// no-op. The identity token is used for the handshake and retained only
    /// by the connection task for reconnection attempts.
    ///
    /// # Errors
    ///
    /// Returns the handshake error if the initial connection attempt fails;
    /// the failure is also surfaced as a `ConnectionStateChanged` event.
    pub async fn connect(&self, endpoint: &str, token: &str) -> Result<(), TransportError> {
        let proceed = {
            let mut info = self
                .shared
                .info
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if info.state == ConnectionState::Disconnected {
                self.shared.deliberate_close.store(false, Ordering::SeqCst);
                *info = Arc::new(ConnectionInfo {
                    state: ConnectionState::Connecting,
                    latency_ms: None,
                    last_error: None,
                });
                true
            } else {
                false
            }
        };
        if !proceed {
            tracing::debug!("connect() ignored: connection already {:?}", self.state());
            return Ok(());
        }
        self.shared
            .dispatcher
            .emit(&RoomEvent::ConnectionStateChanged((*self.info()).clone()));

        match self.connector.connect(endpoint, token).await {
            Err(e) => {
                self.shared.transition(ConnectionInfo {
                    state: ConnectionState::Disconnected,
                    latency_ms: None,
                    last_error: Some(e.to_string()),
                });
                Err(e)
            }
            Ok(mut transport) => {
                // disconnect() may have raced the handshake
                if self.shared.deliberate_close.load(Ordering::SeqCst) {
                    transport.close().await;
                    self.shared.transition(ConnectionInfo {
                        state: ConnectionState::Disconnected,
                        latency_ms: None,
                        last_error: None,
                    });
                    return Ok(());
                }

                let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
                {
                    let mut outgoing = self
                        .shared
                        .outgoing
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    *outgoing = Some(outgoing_tx);
                }
                self.shared.transition(ConnectionInfo {
                    state: ConnectionState::Connected,
                    latency_ms: None,
                    last_error: None,
                });
                tracing::info!("Connected to room coordination service at {}", endpoint);

                tokio::spawn(connection_task(
                    transport,
                    outgoing_rx,
                    Arc::clone(&self.shared),
                    Arc::clone(&self.connector),
                    endpoint.to_string(),
                    token.to_string(),
                ));
                Ok(())
            }
        }
    }

    /// Close the connection deliberately and suppress automatic reconnection
    pub fn disconnect(&self) {
        self.shared.deliberate_close.store(true, Ordering::SeqCst);
        let sender = self
            .shared
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(OutgoingFrame::Close);
        }
    }

    /// Send a request and await its correlated reply.
    ///
    /// Exactly one of three outcomes resolves the call: the matching reply,
    /// the timeout, or loss of the connection. On timeout the correlation
    /// entry is discarded, so a reply arriving later is ignored; no retry
    /// happens at this layer.
    ///
    /// # Arguments
    ///
    /// * `seq` - correlation id embedded in `message`
    /// * `message` - the outbound request
    pub async fn request(
        &self,
        seq: Uuid,
        message: &ClientMessage,
    ) -> Result<ReplyMessage, RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.insert(
                seq,
                PendingRequest {
                    reply_tx,
                    sent_at: Instant::now(),
                },
            );
        }

        if let Err(e) = self.queue(message) {
            self.shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&seq);
            return Err(e);
        }

        match tokio::time::timeout(self.shared.request_timeout, reply_rx).await {
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&seq);
                Err(RequestError::RequestTimeout)
            }
            // The completion was dropped together with the connection
            Ok(Err(_)) => Err(RequestError::ConnectionLost),
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    /// Queue a fire-and-forget message.
    ///
    /// # Errors
    ///
    /// `NotConnected` when there is no established connection.
    pub fn notify(&self, message: &ClientMessage) -> Result<(), RequestError> {
        self.queue(message)
    }

    /// Surface a server-declared error that is not tied to a request.
    ///
    /// No caller awaits these, so the error only updates the connection view
    /// and fans out as `ConnectionStateChanged`. A `forced_disconnect` code
    /// additionally suppresses automatic reconnection for the closure that
    /// follows it.
    pub(crate) fn handle_server_error(&self, error: &ErrorMessage) {
        tracing::warn!(
            "Server error{}: {}",
            error
                .code
                .as_deref()
                .map(|c| format!(" [{}]", c))
                .unwrap_or_default(),
            error.message
        );
        if error.code.as_deref() == Some(ERROR_CODE_FORCED_DISCONNECT) {
            self.shared.deliberate_close.store(true, Ordering::SeqCst);
        }
        let current = self.shared.current();
        self.shared.transition(ConnectionInfo {
            last_error: Some(error.message.clone()),
            ..(*current).clone()
        });
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn queue(&self, message: &ClientMessage) -> Result<(), RequestError> {
        if self.state() != ConnectionState::Connected {
            return Err(RequestError::NotConnected);
        }
        let text = serde_json::to_string(message).map_err(|e| {
            tracing::error!("Failed to serialize outbound message: {}", e);
            RequestError::NotConnected
        })?;
        let outgoing = self
            .shared
            .outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match outgoing.as_ref() {
            Some(tx) if tx.send(OutgoingFrame::Message(text)).is_ok() => Ok(()),
            _ => Err(RequestError::NotConnected),
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("info", &self.info())
            .finish()
    }
}

/// Background task that owns the transport for one logical connection.
///
/// Multiplexes outgoing frames and incoming frames with `tokio::select!`.
/// On an unexpected failure it runs the reconnection policy and, on success,
/// resumes with the fresh transport; any terminal outcome ends the task.
async fn connection_task(
    mut transport: BoxedTransport,
    mut outgoing_rx: mpsc::UnboundedReceiver<OutgoingFrame>,
    shared: Arc<ConnectionShared>,
    connector: Arc<dyn Connector>,
    endpoint: String,
    token: String,
) {
    loop {
        let end = drive_transport(&mut transport, &mut outgoing_rx, &shared).await;

        // Whatever ended the session, in-flight requests can no longer be answered
        shared.fail_pending();

        match end {
            SessionEnd::Deliberate => {
                transport.close().await;
                shared.clear_outgoing();
                shared.transition(ConnectionInfo {
                    state: ConnectionState::Disconnected,
                    latency_ms: None,
                    last_error: None,
                });
                tracing::info!("Disconnected from room coordination service");
                break;
            }
            SessionEnd::ServerClose => {
                shared.clear_outgoing();
                shared.transition(ConnectionInfo {
                    state: ConnectionState::Disconnected,
                    latency_ms: None,
                    last_error: Some("connection closed by server".to_string()),
                });
                tracing::info!("Server closed the connection");
                break;
            }
            SessionEnd::Failed(error) => {
                tracing::warn!("Connection lost: {}", error);
                if shared.deliberate_close.load(Ordering::SeqCst) {
                    shared.clear_outgoing();
                    shared.transition(ConnectionInfo {
                        state: ConnectionState::Disconnected,
                        latency_ms: None,
                        last_error: None,
                    });
                    break;
                }
                match reconnect(&*connector, &endpoint, &token, &shared, error.to_string()).await {
                    Some(next) => {
                        transport = next;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Pump one transport session until it ends
async fn drive_transport(
    transport: &mut BoxedTransport,
    outgoing_rx: &mut mpsc::UnboundedReceiver<OutgoingFrame>,
    shared: &ConnectionShared,
) -> SessionEnd {
    loop {
        tokio::select! {
            frame = outgoing_rx.recv() => match frame {
                Some(OutgoingFrame::Message(text)) => {
                    if let Err(e) = transport.send(text).await {
                        return SessionEnd::Failed(e);
                    }
                }
                Some(OutgoingFrame::Close) | None => return SessionEnd::Deliberate,
            },
            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => shared.handle_incoming(&text),
                Some(Err(e)) => return SessionEnd::Failed(e),
                None => return SessionEnd::ServerClose,
            },
        }
    }
}

/// Run the reconnection policy after an unexpected closure.
///
/// Up to `max_reconnect_attempts` attempts with a linearly increasing delay
/// (base interval × attempt number, capped), surfacing `Reconnecting` state
/// throughout. Exhaustion or a deliberate close during the loop transitions
/// to `Disconnected` and returns `None`.
async fn reconnect(
    connector: &dyn Connector,
    endpoint: &str,
    token: &str,
    shared: &Arc<ConnectionShared>,
    mut last_error: String,
) -> Option<BoxedTransport> {
    for attempt in 1..=shared.max_reconnect_attempts {
        if shared.deliberate_close.load(Ordering::SeqCst) {
            shared.clear_outgoing();
            shared.transition(ConnectionInfo {
                state: ConnectionState::Disconnected,
                latency_ms: None,
                last_error: None,
            });
            return None;
        }

        shared.transition(ConnectionInfo {
            state: ConnectionState::Reconnecting { attempt },
            latency_ms: None,
            last_error: Some(last_error.clone()),
        });

        let delay = (shared.reconnect_base_interval * attempt).min(shared.reconnect_max_interval);
        tracing::info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay,
            attempt,
            shared.max_reconnect_attempts
        );
        tokio::time::sleep(delay).await;

        match connector.connect(endpoint, token).await {
            Ok(transport) => {
                shared.transition(ConnectionInfo {
                    state: ConnectionState::Connected,
                    latency_ms: None,
                    last_error: None,
                });
                tracing::info!("Reconnected to {}", endpoint);
                return Some(transport);
            }
            Err(e) => {
                tracing::warn!("Reconnection attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
            }
        }
    }

    tracing::error!(
        "Failed to reconnect after {} attempts",
        shared.max_reconnect_attempts
    );
    shared.clear_outgoing();
    shared.transition(ConnectionInfo {
        state: ConnectionState::Disconnected,
        latency_ms: None,
        last_error: Some(last_error),
    });
    None
}
