//! Domain model for the quiz room synchronization layer.
//!
//! Entities mirror what the room coordination service is authoritative for:
//! the room, its participant roster, the current question, and the
//! leaderboard. The composite of all four at a point in time is a
//! [`RoomSnapshot`]; inbound events always produce a new snapshot instead of
//! patching the previous one.

mod entity;
mod event;
mod snapshot;

pub use entity::{
    Answer, LeaderboardEntry, Participant, PresenceState, Question, Role, Room, RoomConfig,
    RoomStatus,
};
pub use event::{ConnectionInfo, ConnectionState, EventKind, RoomCloseReason, RoomEvent};
pub use snapshot::{CurrentQuestion, QuestionPhase, RoomSnapshot, SharedRoomState};
