//! WebSocket message DTOs for the room coordination protocol.
//!
//! All messages are JSON text frames, internally tagged by a `type` field.
//! Outbound requests that expect a reply carry a `seq` correlation id; the
//! matching reply arrives as a `reply` message with the same `seq`. Push
//! messages carry the `room_id` they belong to so that residual events from
//! a just-left room can be dropped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Client → Server
// ========================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join an existing room by access code (expects a reply)
    JoinRoom {
        seq: Uuid,
        access_code: String,
        display_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<RoleDto>,
    },
    /// Leave the current room (fire-and-forget)
    LeaveRoom { room_id: String },
    /// Submit an answer for the current question (expects a reply)
    SubmitAnswer {
        seq: Uuid,
        room_id: String,
        question_id: String,
        selected_option: String,
        elapsed_time: f64,
    },
    /// Send a chat message into the room (fire-and-forget)
    SendMessage { room_id: String, message: String },
}

impl ClientMessage {
    /// The correlation id of this message, if it expects a reply
    pub fn seq(&self) -> Option<Uuid> {
        match self {
            ClientMessage::JoinRoom { seq, .. } | ClientMessage::SubmitAnswer { seq, .. } => {
                Some(*seq)
            }
            ClientMessage::LeaveRoom { .. } | ClientMessage::SendMessage { .. } => None,
        }
    }
}

// ========================================
// Server → Client
// ========================================

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Correlated reply to a `join_room` or `submit_answer` request
    Reply(ReplyMessage),
    /// Full room state after a successful join or a post-reconnect re-sync
    RoomJoined(RoomJoinedMessage),
    /// Another participant entered the room
    ParticipantJoined(ParticipantJoinedMessage),
    /// A participant left or was removed by the host
    ParticipantLeft(ParticipantLeftMessage),
    /// A new question became current
    QuestionStarted(QuestionStartedMessage),
    /// A participant's answer reached the server
    AnswerReceived(AnswerReceivedMessage),
    /// Full leaderboard replacement, ordered by rank
    LeaderboardUpdated(LeaderboardUpdatedMessage),
    /// The quiz ended and the room was closed
    RoomFinished(RoomFinishedMessage),
    /// Server-declared error not tied to a specific request
    Error(ErrorMessage),
}

/// Reply to a correlated request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub seq: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<ParticipantDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Server-declared failure attached to an unsuccessful reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Rejection code for an invalid access code
pub const ERROR_CODE_INVALID_CODE: &str = "invalid_code";
/// Rejection code for a room at capacity
pub const ERROR_CODE_ROOM_FULL: &str = "room_full";
/// Rejection code for a room whose quiz already finished
pub const ERROR_CODE_ROOM_FINISHED: &str = "room_finished";
/// Rejection code for a question that already has an answer from this participant
pub const ERROR_CODE_ALREADY_ANSWERED: &str = "already_answered";
/// Server error code that suppresses automatic reconnection
pub const ERROR_CODE_FORCED_DISCONNECT: &str = "forced_disconnect";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomJoinedMessage {
    pub room: RoomDto,
    pub participant: ParticipantDto,
    pub participants: Vec<ParticipantDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantJoinedMessage {
    pub room_id: String,
    pub participant: ParticipantDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLeftMessage {
    pub room_id: String,
    pub participant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionStartedMessage {
    pub room_id: String,
    pub question: QuestionDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerReceivedMessage {
    pub room_id: String,
    pub question_id: String,
    pub participant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded_points: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardUpdatedMessage {
    pub room_id: String,
    pub entries: Vec<LeaderboardEntryDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomFinishedMessage {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ========================================
// Shared payload DTOs
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatusDto {
    Waiting,
    Active,
    Finished,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomConfigDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_time_limit_secs: Option<u32>,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(default)]
    pub show_correct_answers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDto {
    pub id: String,
    pub name: String,
    pub join_code: String,
    pub status: RoomStatusDto,
    pub capacity: u32,
    #[serde(default)]
    pub config: RoomConfigDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleDto {
    Host,
    Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceDto {
    Connected,
    Disconnected,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub role: RoleDto,
    pub connection: PresenceDto,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub last_activity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDto {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub time_limit_secs: u32,
    #[serde(default)]
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntryDto {
    pub participant_id: String,
    pub score: u32,
    pub rank: u32,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub average_time_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_join_room() {
        // テスト項目: join_room メッセージが type タグと seq を含めてシリアライズされる
        // given (前提条件):
        let seq = Uuid::new_v4();
        let msg = ClientMessage::JoinRoom {
            seq,
            access_code: "ABC123".to_string(),
            display_name: "Ana".to_string(),
            role: None,
        };

        // when (操作):
        let json = serde_json::to_string(&msg).unwrap();

        // then (期待する結果):
        assert!(json.contains("\"type\":\"join_room\""));
        assert!(json.contains("ABC123"));
        assert!(json.contains(&seq.to_string()));
        assert!(!json.contains("role"));
    }

    #[test]
    fn test_parse_reply_with_room_payload() {
        // テスト項目: room と participants を含む reply がパースできる
        // given (前提条件):
        let seq = Uuid::new_v4();
        let json = format!(
            r#"{{
                "type": "reply",
                "seq": "{seq}",
                "success": true,
                "room": {{
                    "id": "room-1", "name": "Friday Quiz", "join_code": "ABC123",
                    "status": "waiting", "capacity": 30
                }},
                "participant": {{
                    "id": "p1", "user_id": "u1", "display_name": "Ana",
                    "role": "participant", "connection": "connected"
                }},
                "participants": [{{
                    "id": "p1", "user_id": "u1", "display_name": "Ana",
                    "role": "participant", "connection": "connected"
                }}]
            }}"#
        );

        // when (操作):
        let msg: ServerMessage = serde_json::from_str(&json).unwrap();

        // then (期待する結果):
        let ServerMessage::Reply(reply) = msg else {
            panic!("expected a reply message");
        };
        assert_eq!(reply.seq, seq);
        assert!(reply.success);
        assert_eq!(reply.room.unwrap().join_code, "ABC123");
        assert_eq!(reply.participants.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejected_reply() {
        // テスト項目: エラーコード付きの拒否 reply がパースできる
        // given (前提条件):
        let seq = Uuid::new_v4();
        let json = format!(
            r#"{{"type": "reply", "seq": "{seq}", "success": false,
                 "error": {{"message": "room is full", "code": "room_full"}}}}"#
        );

        // when (操作):
        let msg: ServerMessage = serde_json::from_str(&json).unwrap();

        // then (期待する結果):
        let ServerMessage::Reply(reply) = msg else {
            panic!("expected a reply message");
        };
        assert!(!reply.success);
        let error = reply.error.unwrap();
        assert_eq!(error.code.as_deref(), Some(ERROR_CODE_ROOM_FULL));
    }

    #[test]
    fn test_parse_question_started_push() {
        // テスト項目: question_started プッシュがパースできる
        // given (前提条件):
        let json = r#"{
            "type": "question_started",
            "room_id": "room-1",
            "question": {
                "id": "q7", "prompt": "What is the tallest mountain in Japan?",
                "options": ["Mt. Fuji", "Mt. Kita", "Mt. Hotaka"],
                "time_limit_secs": 20, "points": 100
            }
        }"#;

        // when (操作):
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        let ServerMessage::QuestionStarted(started) = msg else {
            panic!("expected a question_started message");
        };
        assert_eq!(started.room_id, "room-1");
        assert_eq!(started.question.id, "q7");
        assert_eq!(started.question.options.len(), 3);
    }

    #[test]
    fn test_seq_present_only_on_request_messages() {
        // テスト項目: reply を期待するメッセージのみ seq を持つ
        // given (前提条件):
        let join = ClientMessage::JoinRoom {
            seq: Uuid::new_v4(),
            access_code: "ABC123".to_string(),
            display_name: "Ana".to_string(),
            role: None,
        };
        let leave = ClientMessage::LeaveRoom {
            room_id: "room-1".to_string(),
        };

        // when (操作) / then (期待する結果):
        assert!(join.seq().is_some());
        assert!(leave.seq().is_none());
    }
}
