//! The room synchronization client.
//!
//! Four cooperating components behind one facade:
//!
//! - [`ConnectionManager`] owns the single persistent transport connection
//! - [`RoomSession`] turns join/leave into correlated exchanges and owns the
//!   room + roster snapshot
//! - [`QuizFlow`] tracks the current question, submits answers, and ingests
//!   leaderboard updates
//! - [`EventDispatcher`] fans domain events out to presentation code
//!
//! [`RoomClient`] constructs and wires them once at application bootstrap.
//! Server-pushed events enter through the connection manager and are applied
//! by a single pump task in strict delivery order.

mod connection;
mod dispatcher;
mod error;
mod formatter;
mod quiz;
mod runner;
mod session;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::time::SystemClock;
use crate::domain::{ConnectionInfo, RoomSnapshot, SharedRoomState};
use crate::infrastructure::dto::websocket::ServerMessage;
use crate::infrastructure::transport::{Connector, TransportError, WebSocketConnector};

pub use connection::{
    ConnectionManager, MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_INTERVAL, RECONNECT_MAX_INTERVAL,
    REQUEST_TIMEOUT,
};
pub use dispatcher::{EventDispatcher, Subscription};
pub use error::{AnswerError, JoinError, RequestError, SendError};
pub use quiz::QuizFlow;
pub use runner::run_client;
pub use session::{JoinedRoom, RoomSession};

/// Tunables for a [`RoomClient`]
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hayaoshi::client::RoomClientConfig;
///
/// let config = RoomClientConfig::default()
///     .with_request_timeout(Duration::from_secs(5));
/// assert_eq!(config.request_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct RoomClientConfig {
    /// Reply wait window for correlated requests
    pub request_timeout: Duration,
    /// Maximum automatic reconnection attempts after an unexpected closure
    pub max_reconnect_attempts: u32,
    /// Base delay between reconnection attempts; grows linearly per attempt
    pub reconnect_base_interval: Duration,
    /// Upper bound on the per-attempt reconnection delay
    pub reconnect_max_interval: Duration,
}

impl Default for RoomClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: REQUEST_TIMEOUT,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_base_interval: RECONNECT_BASE_INTERVAL,
            reconnect_max_interval: RECONNECT_MAX_INTERVAL,
        }
    }
}

impl RoomClientConfig {
    /// Set the reply wait window for correlated requests
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum automatic reconnection attempts
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the base delay between reconnection attempts
    #[must_use]
    pub fn with_reconnect_base_interval(mut self, interval: Duration) -> Self {
        self.reconnect_base_interval = interval;
        self
    }
}

/// Facade over the room synchronization layer.
///
/// Constructed once per process (per tab, in the original deployment);
/// exactly one connection exists per client instance, and the room session
/// and quiz flow share it by reference.
pub struct RoomClient {
    connection: Arc<ConnectionManager>,
    session: Arc<RoomSession>,
    quiz: Arc<QuizFlow>,
    dispatcher: Arc<EventDispatcher>,
    state: Arc<SharedRoomState>,
    pump: JoinHandle<()>,
}

impl RoomClient {
    /// Create a client using the production WebSocket connector
    pub fn new(config: RoomClientConfig) -> Self {
        Self::with_connector(Arc::new(WebSocketConnector), config)
    }

    /// Create a client over a custom [`Connector`] (used by tests to drive
    /// the client with in-memory transports)
    pub fn with_connector(connector: Arc<dyn Connector>, config: RoomClientConfig) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let state = Arc::new(SharedRoomState::new());
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let connection = Arc::new(ConnectionManager::new(
            connector,
            server_tx,
            Arc::clone(&dispatcher),
            &config,
        ));
        let session = Arc::new(RoomSession::new(
            Arc::clone(&connection),
            Arc::clone(&state),
            Arc::clone(&dispatcher),
        ));
        let quiz = Arc::new(QuizFlow::new(
            Arc::clone(&connection),
            Arc::clone(&state),
            Arc::clone(&dispatcher),
            Arc::new(SystemClock),
        ));

        let pump = tokio::spawn(pump_events(
            server_rx,
            Arc::clone(&connection),
            Arc::clone(&session),
            Arc::clone(&quiz),
        ));

        Self {
            connection,
            session,
            quiz,
            dispatcher,
            state,
            pump,
        }
    }

    /// Connect to the room coordination service.
    ///
    /// The `token` comes from the external session provider and is only used
    /// for the lifetime of this connection.
    pub async fn connect(&self, endpoint: &str, token: &str) -> Result<(), TransportError> {
        self.connection.connect(endpoint, token).await
    }

    /// Close the connection deliberately (no automatic reconnection)
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// The room session controller (join, leave, chat)
    pub fn session(&self) -> &RoomSession {
        &self.session
    }

    /// The quiz flow coordinator (questions, answers, leaderboard)
    pub fn quiz(&self) -> &QuizFlow {
        &self.quiz
    }

    /// The event dispatcher for presentation-layer subscriptions
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// The latest immutable room snapshot
    pub fn snapshot(&self) -> Arc<RoomSnapshot> {
        self.state.load()
    }

    /// The current connection view
    pub fn connection_info(&self) -> Arc<ConnectionInfo> {
        self.connection.info()
    }

    pub(crate) fn shared_state(&self) -> Arc<SharedRoomState> {
        Arc::clone(&self.state)
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        // The pump holds no resources beyond the channel; abort is enough
        self.pump.abort();
    }
}

impl std::fmt::Debug for RoomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomClient")
            .field("connection", &self.connection)
            .field("snapshot_version", &self.state.load().version)
            .finish()
    }
}

/// Apply server-pushed events in strict delivery order.
///
/// This task is the only writer for push-driven snapshot replacements, so
/// readers never observe a roster that is half applied.
async fn pump_events(
    mut server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    connection: Arc<ConnectionManager>,
    session: Arc<RoomSession>,
    quiz: Arc<QuizFlow>,
) {
    while let Some(message) = server_rx.recv().await {
        match message {
            ServerMessage::RoomJoined(m) => session.apply_room_joined(m),
            ServerMessage::ParticipantJoined(m) => session.apply_participant_joined(m),
            ServerMessage::ParticipantLeft(m) => session.apply_participant_left(m),
            ServerMessage::QuestionStarted(m) => quiz.apply_question_started(m),
            ServerMessage::AnswerReceived(m) => quiz.apply_answer_received(m),
            ServerMessage::LeaderboardUpdated(m) => quiz.apply_leaderboard_updated(m),
            ServerMessage::RoomFinished(m) => session.apply_room_finished(m),
            ServerMessage::Error(m) => connection.handle_server_error(&m),
            // Replies are routed by the connection manager before they get here
            ServerMessage::Reply(m) => {
                tracing::debug!("Unrouted reply for correlation id {}", m.seq);
            }
        }
    }
    tracing::debug!("Event pump stopped");
}
