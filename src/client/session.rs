//! Room session control: joining and leaving rooms, and the participant
//! roster.
//!
//! Owns the authoritative local view of the current room. Join is a
//! correlated request/reply exchange with single-flight protection; leave is
//! fire-and-forget for responsiveness (local state clears immediately,
//! whether or not the server ever confirms).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::client::connection::ConnectionManager;
use crate::client::dispatcher::EventDispatcher;
use crate::client::error::{JoinError, SendError};
use crate::domain::{
    Participant, Room, RoomCloseReason, RoomEvent, RoomSnapshot, SharedRoomState,
};
use crate::infrastructure::dto::websocket::{
    ClientMessage, ParticipantDto, ParticipantJoinedMessage, ParticipantLeftMessage,
    RoomFinishedMessage, RoomJoinedMessage,
};

/// Payload of a successful join
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub room: Room,
    /// The local user's own roster entry
    pub participant: Participant,
    pub participants: Vec<Participant>,
}

/// Controller for the current room and its roster
pub struct RoomSession {
    connection: Arc<ConnectionManager>,
    state: Arc<SharedRoomState>,
    dispatcher: Arc<EventDispatcher>,
    join_in_flight: AtomicBool,
}

impl RoomSession {
    pub(crate) fn new(
        connection: Arc<ConnectionManager>,
        state: Arc<SharedRoomState>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            connection,
            state,
            dispatcher,
            join_in_flight: AtomicBool::new(false),
        }
    }

    /// Join a room by access code.
    ///
    /// Only one join may be in flight at a time; a second call while one is
    /// pending fails fast with [`JoinError::AlreadyInProgress`] without
    /// sending a second request. Server-declared rejections and transport
    /// failures are both returned as [`JoinError`] variants; this method
    /// never panics on expected failures.
    ///
    /// On success the room, roster, question, and leaderboard snapshot is
    /// replaced atomically and a `ParticipantJoined` event for the local
    /// user fires exactly once.
    pub async fn join_room(
        &self,
        access_code: &str,
        display_name: &str,
    ) -> Result<JoinedRoom, JoinError> {
        if self.join_in_flight.swap(true, Ordering::SeqCst) {
            return Err(JoinError::AlreadyInProgress);
        }
        let result = self.join_room_inner(access_code, display_name).await;
        self.join_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn join_room_inner(
        &self,
        access_code: &str,
        display_name: &str,
    ) -> Result<JoinedRoom, JoinError> {
        let seq = Uuid::new_v4();
        let message = ClientMessage::JoinRoom {
            seq,
            access_code: access_code.to_string(),
            display_name: display_name.to_string(),
            role: None,
        };

        let reply = self.connection.request(seq, &message).await?;
        if !reply.success {
            return Err(JoinError::from_rejection(reply.error));
        }

        let (Some(room_dto), Some(participant_dto)) = (reply.room, reply.participant) else {
            tracing::warn!("Join reply claimed success but carried no room payload");
            return Err(JoinError::Rejected("malformed join reply".to_string()));
        };

        let room: Room = room_dto.into();
        let local: Participant = participant_dto.into();
        let roster = build_roster(reply.participants.unwrap_or_default(), &local);

        let joined = JoinedRoom {
            room: room.clone(),
            participant: local.clone(),
            participants: roster.values().cloned().collect(),
        };

        let local_id = local.id.clone();
        self.state.update(move |_| {
            Some(RoomSnapshot {
                room: Some(room),
                local_participant_id: Some(local_id),
                participants: roster,
                ..RoomSnapshot::empty()
            })
        });
        tracing::info!(
            "Joined room '{}' as '{}' ({} participant(s))",
            joined.room.name,
            joined.participant.display_name,
            joined.participants.len()
        );

        self.dispatcher.emit(&RoomEvent::ParticipantJoined(local));
        Ok(joined)
    }

    /// Leave the current room.
    ///
    /// The leave notification is best-effort; local room, roster, question,
    /// and leaderboard state clears immediately either way, and a
    /// `RoomClosed` event with reason `Left` fires. A no-op when not inside
    /// a room.
    pub fn leave_room(&self) {
        let snapshot = self.state.load();
        let Some(room) = snapshot.room.as_ref() else {
            tracing::debug!("leave_room ignored: not in a room");
            return;
        };

        let message = ClientMessage::LeaveRoom {
            room_id: room.id.clone(),
        };
        if let Err(e) = self.connection.notify(&message) {
            tracing::debug!("Leave notification not sent: {}", e);
        }

        self.state.update(|_| Some(RoomSnapshot::empty()));
        self.dispatcher.emit(&RoomEvent::RoomClosed {
            reason: RoomCloseReason::Left,
        });
        tracing::info!("Left room '{}'", room.name);
    }

    /// Send a chat message into the current room (fire-and-forget)
    ///
    /// # Errors
    ///
    /// * [`SendError::NotInRoom`] when no room is joined
    /// * [`SendError::Request`] when the connection is down
    pub fn send_chat_message(&self, message: &str) -> Result<(), SendError> {
        let snapshot = self.state.load();
        let room = snapshot.room.as_ref().ok_or(SendError::NotInRoom)?;
        self.connection.notify(&ClientMessage::SendMessage {
            room_id: room.id.clone(),
            message: message.to_string(),
        })?;
        Ok(())
    }

    /// Apply a full room re-sync push.
    ///
    /// This is also how the roster and leaderboard are refreshed after a
    /// reconnect; the server is the source of truth. Entering a room this
    /// way emits the local `ParticipantJoined` notification; a re-sync of
    /// the room already joined replaces the snapshot silently.
    pub(crate) fn apply_room_joined(&self, message: RoomJoinedMessage) {
        let already_in_room = {
            let current = self.state.load();
            current
                .room
                .as_ref()
                .is_some_and(|room| room.id == message.room.id)
        };

        let room: Room = message.room.into();
        let local: Participant = message.participant.into();
        let roster = build_roster(message.participants, &local);

        let room_name = room.name.clone();
        let local_id = local.id.clone();
        let local_for_event = local;
        self.state.update(move |_| {
            Some(RoomSnapshot {
                room: Some(room),
                local_participant_id: Some(local_id),
                participants: roster,
                ..RoomSnapshot::empty()
            })
        });

        if already_in_room {
            tracing::debug!("Room '{}' state re-synced", room_name);
        } else {
            self.dispatcher
                .emit(&RoomEvent::ParticipantJoined(local_for_event));
        }
    }

    /// Apply a `participant_joined` push; duplicate delivery is a no-op
    pub(crate) fn apply_participant_joined(&self, message: ParticipantJoinedMessage) {
        let mut inserted: Option<Participant> = None;
        self.state.update(|current| {
            let room = current.room.as_ref()?;
            if room.id != message.room_id {
                tracing::debug!(
                    "Dropping participant_joined for room {} (current room is {})",
                    message.room_id,
                    room.id
                );
                return None;
            }
            if current.participants.contains_key(&message.participant.id) {
                tracing::debug!(
                    "Duplicate participant_joined for '{}'",
                    message.participant.id
                );
                return None;
            }

            let participant: Participant = message.participant.into();
            inserted = Some(participant.clone());
            let mut participants = current.participants.clone();
            participants.insert(participant.id.clone(), participant);
            Some(RoomSnapshot {
                participants,
                ..current.clone()
            })
        });

        if let Some(participant) = inserted {
            self.dispatcher
                .emit(&RoomEvent::ParticipantJoined(participant));
        }
    }

    /// Apply a `participant_left` push.
    ///
    /// Removal of the local user (a kick) tears the whole room down and
    /// emits a dedicated `RoomClosed` event so the UI can show an explicit
    /// message instead of a silent room disappearance.
    pub(crate) fn apply_participant_left(&self, message: ParticipantLeftMessage) {
        let mut event: Option<RoomEvent> = None;
        self.state.update(|current| {
            let room = current.room.as_ref()?;
            if room.id != message.room_id {
                tracing::debug!(
                    "Dropping participant_left for room {} (current room is {})",
                    message.room_id,
                    room.id
                );
                return None;
            }

            if current.local_participant_id.as_deref() == Some(message.participant_id.as_str()) {
                event = Some(RoomEvent::RoomClosed {
                    reason: RoomCloseReason::Kicked,
                });
                return Some(RoomSnapshot::empty());
            }

            if !current.participants.contains_key(&message.participant_id) {
                tracing::debug!(
                    "participant_left for unknown participant '{}'",
                    message.participant_id
                );
                return None;
            }
            let mut participants = current.participants.clone();
            participants.remove(&message.participant_id);
            event = Some(RoomEvent::ParticipantLeft {
                participant_id: message.participant_id.clone(),
                participant_name: message.participant_name.clone(),
            });
            Some(RoomSnapshot {
                participants,
                ..current.clone()
            })
        });

        match &event {
            Some(RoomEvent::RoomClosed { .. }) => {
                tracing::info!("Removed from room by the host");
            }
            Some(RoomEvent::ParticipantLeft { participant_id, .. }) => {
                tracing::debug!("Participant '{}' left", participant_id);
            }
            _ => {}
        }
        if let Some(event) = event {
            self.dispatcher.emit(&event);
        }
    }

    /// Apply a `room_finished` push: the quiz ended and the room is gone
    pub(crate) fn apply_room_finished(&self, message: RoomFinishedMessage) {
        let mut closed = false;
        self.state.update(|current| {
            let room = current.room.as_ref()?;
            if room.id != message.room_id {
                tracing::debug!(
                    "Dropping room_finished for room {} (current room is {})",
                    message.room_id,
                    room.id
                );
                return None;
            }
            closed = true;
            Some(RoomSnapshot::empty())
        });

        if closed {
            tracing::info!("Quiz finished, room closed");
            self.dispatcher.emit(&RoomEvent::RoomClosed {
                reason: RoomCloseReason::Finished,
            });
        }
    }
}

/// Build the roster map, making sure the local user's own entry is present
fn build_roster(
    participants: Vec<ParticipantDto>,
    local: &Participant,
) -> HashMap<String, Participant> {
    let mut roster: HashMap<String, Participant> = participants
        .into_iter()
        .map(|dto| {
            let participant: Participant = dto.into();
            (participant.id.clone(), participant)
        })
        .collect();
    roster
        .entry(local.id.clone())
        .or_insert_with(|| local.clone());
    roster
}
