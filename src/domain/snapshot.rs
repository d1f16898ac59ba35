//! Immutable room snapshots and the shared state container.
//!
//! The room, roster, current question, and leaderboard together form one
//! atomic snapshot. Any inbound event that changes one of them produces a new
//! snapshot; readers hold an `Arc` to a fully consistent version and can
//! never observe a half-applied update.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::entity::{Answer, LeaderboardEntry, Participant, Question, Room};

/// Sub-state of the current question's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPhase {
    /// Accepting answers
    Active,
    /// The local participant's answer was acknowledged by the server
    Answered,
    /// The question's time limit elapsed without an acknowledged answer
    TimedOut,
}

/// The question currently presented to the room, if any
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentQuestion {
    pub question: Question,
    pub phase: QuestionPhase,
    /// Unix timestamp (milliseconds) at which the question arrived locally
    pub started_at: i64,
    /// Local submission awaiting acknowledgment, cleared on ack or next question
    pub pending_answer: Option<Answer>,
}

/// Immutable composite of room + roster + current question + leaderboard
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    /// Monotonically increasing version, bumped on every replacement
    pub version: u64,
    pub room: Option<Room>,
    /// Participant id of the local user, present once joined
    pub local_participant_id: Option<String>,
    /// Roster keyed by participant id; ids are unique within a room
    pub participants: HashMap<String, Participant>,
    pub question: Option<CurrentQuestion>,
    /// Leaderboard rows in server-provided display order
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl RoomSnapshot {
    /// Snapshot with no room joined (also the post-leave state)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the local user is currently inside a room
    pub fn is_in_room(&self) -> bool {
        self.room.is_some()
    }

    /// The local user's roster entry, if joined
    pub fn local_participant(&self) -> Option<&Participant> {
        self.local_participant_id
            .as_ref()
            .and_then(|id| self.participants.get(id))
    }
}

/// Process-wide holder of the current [`RoomSnapshot`].
///
/// Mutation goes through [`SharedRoomState::update`], which swaps in a new
/// `Arc` under a short lock and bumps the version. Readers call
/// [`SharedRoomState::load`] and keep the returned `Arc` for as long as they
/// need a consistent view.
#[derive(Debug)]
pub struct SharedRoomState {
    current: Mutex<Arc<RoomSnapshot>>,
}

impl SharedRoomState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(RoomSnapshot::empty())),
        }
    }

    /// The latest snapshot
    pub fn load(&self) -> Arc<RoomSnapshot> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the snapshot atomically.
    ///
    /// The closure receives the current snapshot and returns the next one, or
    /// `None` to leave the state untouched (e.g. when an event is dropped by
    /// a guard). The version of the produced snapshot is assigned here; the
    /// closure's `version` field is ignored.
    ///
    /// # Returns
    ///
    /// The newly installed snapshot, or `None` if the closure declined.
    pub fn update(
        &self,
        f: impl FnOnce(&RoomSnapshot) -> Option<RoomSnapshot>,
    ) -> Option<Arc<RoomSnapshot>> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let next = f(&current)?;
        let next = Arc::new(RoomSnapshot {
            version: current.version + 1,
            ..next
        });
        *current = Arc::clone(&next);
        Some(next)
    }
}

impl Default for SharedRoomState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{RoomConfig, RoomStatus};

    fn test_room() -> Room {
        Room {
            id: "room-1".to_string(),
            name: "Friday Quiz".to_string(),
            join_code: "ABC123".to_string(),
            status: RoomStatus::Waiting,
            capacity: 30,
            config: RoomConfig::default(),
        }
    }

    #[test]
    fn test_update_bumps_version() {
        // テスト項目: update のたびにスナップショットのバージョンが増加する
        // given (前提条件):
        let state = SharedRoomState::new();
        assert_eq!(state.load().version, 0);

        // when (操作):
        state.update(|current| {
            Some(RoomSnapshot {
                room: Some(test_room()),
                ..current.clone()
            })
        });
        state.update(|current| Some(current.clone()));

        // then (期待する結果):
        assert_eq!(state.load().version, 2);
    }

    #[test]
    fn test_update_declined_keeps_snapshot() {
        // テスト項目: クロージャが None を返した場合、スナップショットは置き換えられない
        // given (前提条件):
        let state = SharedRoomState::new();
        let before = state.load();

        // when (操作):
        let result = state.update(|_| None);

        // then (期待する結果):
        assert!(result.is_none());
        let after = state.load();
        assert_eq!(after.version, before.version);
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_readers_keep_consistent_view_across_replacement() {
        // テスト項目: 置き換え後も、読み手が保持する旧スナップショットは不変のまま
        // given (前提条件):
        let state = SharedRoomState::new();
        let old = state.load();

        // when (操作):
        state.update(|current| {
            Some(RoomSnapshot {
                room: Some(test_room()),
                ..current.clone()
            })
        });

        // then (期待する結果):
        assert!(old.room.is_none());
        assert!(state.load().room.is_some());
    }

    #[test]
    fn test_local_participant_lookup() {
        // テスト項目: local_participant が roster から自分自身のエントリを返す
        // given (前提条件):
        use crate::domain::entity::{PresenceState, Role};
        let me = Participant {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            display_name: "Ana".to_string(),
            role: Role::Participant,
            presence: PresenceState::Connected,
            score: 0,
            last_activity: 0,
        };
        let mut participants = HashMap::new();
        participants.insert(me.id.clone(), me.clone());
        let snapshot = RoomSnapshot {
            room: Some(test_room()),
            local_participant_id: Some("p1".to_string()),
            participants,
            ..RoomSnapshot::empty()
        };

        // when (操作):
        let found = snapshot.local_participant();

        // then (期待する結果):
        assert_eq!(found, Some(&me));
    }
}
