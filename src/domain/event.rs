//! Domain events fanned out to presentation code.
//!
//! Every event identifies precisely what changed. There is deliberately no
//! catch-all "state changed" event, so subscribers can avoid unnecessary
//! re-renders.

use super::entity::{LeaderboardEntry, Participant, Question};

/// State of the single logical connection to the room coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Automatic reconnection in progress after an unexpected closure
    Reconnecting { attempt: u32 },
}

/// Immutable view of the connection, replaced on every state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    /// Round-trip time of the most recent correlated reply in milliseconds
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl ConnectionInfo {
    /// Initial, never-connected state
    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            latency_ms: None,
            last_error: None,
        }
    }
}

/// Why the local room state was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCloseReason {
    /// The local user left voluntarily
    Left,
    /// The host forcibly removed the local user
    Kicked,
    /// The quiz finished and the room was closed by the server
    Finished,
}

/// Domain event delivered through the [`EventDispatcher`](crate::client::EventDispatcher)
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ParticipantJoined(Participant),
    ParticipantLeft {
        participant_id: String,
        participant_name: Option<String>,
    },
    QuestionStarted(Question),
    AnswerAcknowledged {
        participant_id: String,
        question_id: String,
    },
    LeaderboardUpdated(Vec<LeaderboardEntry>),
    RoomClosed {
        reason: RoomCloseReason,
    },
    ConnectionStateChanged(ConnectionInfo),
}

/// Subscription key for [`RoomEvent`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ParticipantJoined,
    ParticipantLeft,
    QuestionStarted,
    AnswerAcknowledged,
    LeaderboardUpdated,
    RoomClosed,
    ConnectionStateChanged,
}

impl RoomEvent {
    /// The subscription key this event is delivered under
    pub fn kind(&self) -> EventKind {
        match self {
            RoomEvent::ParticipantJoined(_) => EventKind::ParticipantJoined,
            RoomEvent::ParticipantLeft { .. } => EventKind::ParticipantLeft,
            RoomEvent::QuestionStarted(_) => EventKind::QuestionStarted,
            RoomEvent::AnswerAcknowledged { .. } => EventKind::AnswerAcknowledged,
            RoomEvent::LeaderboardUpdated(_) => EventKind::LeaderboardUpdated,
            RoomEvent::RoomClosed { .. } => EventKind::RoomClosed,
            RoomEvent::ConnectionStateChanged(_) => EventKind::ConnectionStateChanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_event_kind_mapping() {
        // テスト項目: RoomEvent が対応する EventKind に正しくマッピングされる
        // given (前提条件):
        let event = RoomEvent::RoomClosed {
            reason: RoomCloseReason::Kicked,
        };

        // when (操作):
        let kind = event.kind();

        // then (期待する結果):
        assert_eq!(kind, EventKind::RoomClosed);
    }

    #[test]
    fn test_connection_state_changed_kind_mapping() {
        // テスト項目: 接続状態イベントが ConnectionStateChanged にマッピングされる
        // given (前提条件):
        let event = RoomEvent::ConnectionStateChanged(ConnectionInfo::disconnected());

        // when (操作):
        let kind = event.kind();

        // then (期待する結果):
        assert_eq!(kind, EventKind::ConnectionStateChanged);
    }
}
