//! Quiz flow coordination: question progression, answer submission, and
//! leaderboard ingestion.
//!
//! A question's lifecycle is `Active → (Answered | TimedOut)`; the arrival
//! of the next question always forces the transition regardless of the
//! current sub-state. The leaderboard is replaced wholesale on every push,
//! in the order the server provides — display order is authoritative from
//! the source and never re-sorted here.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::client::connection::ConnectionManager;
use crate::client::dispatcher::EventDispatcher;
use crate::client::error::AnswerError;
use crate::common::time::Clock;
use crate::domain::{
    Answer, CurrentQuestion, LeaderboardEntry, Question, QuestionPhase, RoomEvent, RoomSnapshot,
    SharedRoomState,
};
use crate::infrastructure::dto::websocket::{
    AnswerReceivedMessage, ClientMessage, ERROR_CODE_ALREADY_ANSWERED, LeaderboardUpdatedMessage,
    QuestionStartedMessage,
};

/// Coordinator for the current question and the leaderboard
pub struct QuizFlow {
    connection: Arc<ConnectionManager>,
    state: Arc<SharedRoomState>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
}

impl QuizFlow {
    pub(crate) fn new(
        connection: Arc<ConnectionManager>,
        state: Arc<SharedRoomState>,
        dispatcher: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection,
            state,
            dispatcher,
            clock,
        }
    }

    /// Submit an answer for the current question.
    ///
    /// Fails locally with [`AnswerError::NoActiveQuestion`] when no question
    /// is current and with [`AnswerError::AlreadyAnswered`] after an
    /// acknowledged answer for the same question. A timed-out or failed
    /// submission does not latch `AlreadyAnswered`, so the caller may retry.
    /// The server remains the final arbiter; the local checks only
    /// short-circuit obviously redundant submissions.
    ///
    /// # Arguments
    ///
    /// * `selected_option` - the chosen option, as presented
    /// * `elapsed_secs` - seconds between question start and the selection
    pub async fn submit_answer(
        &self,
        selected_option: &str,
        elapsed_secs: f64,
    ) -> Result<(), AnswerError> {
        let snapshot = self.state.load();
        let (room_id, question_id, local_participant_id) = {
            let room = snapshot.room.as_ref().ok_or(AnswerError::NoActiveQuestion)?;
            let current = snapshot
                .question
                .as_ref()
                .ok_or(AnswerError::NoActiveQuestion)?;
            if current.phase == QuestionPhase::Answered {
                return Err(AnswerError::AlreadyAnswered);
            }
            (
                room.id.clone(),
                current.question.id.clone(),
                snapshot.local_participant_id.clone().unwrap_or_default(),
            )
        };

        let answer = Answer {
            question_id: question_id.clone(),
            selected_option: selected_option.to_string(),
            elapsed_secs,
        };
        self.set_pending_answer(&question_id, Some(answer));

        let seq = Uuid::new_v4();
        let message = ClientMessage::SubmitAnswer {
            seq,
            room_id,
            question_id: question_id.clone(),
            selected_option: selected_option.to_string(),
            elapsed_time: elapsed_secs,
        };

        let reply = match self.connection.request(seq, &message).await {
            Ok(reply) => reply,
            Err(e) => {
                // The submission never confirmed; leave the question answerable
                self.set_pending_answer(&question_id, None);
                return Err(AnswerError::Request(e));
            }
        };

        if !reply.success {
            self.set_pending_answer(&question_id, None);
            let detail = reply.error;
            let already_answered = detail.as_ref().and_then(|d| d.code.as_deref())
                == Some(ERROR_CODE_ALREADY_ANSWERED);
            return Err(if already_answered {
                AnswerError::AlreadyAnswered
            } else {
                AnswerError::Rejected(
                    detail
                        .map(|d| d.message)
                        .unwrap_or_else(|| "answer rejected without details".to_string()),
                )
            });
        }

        // Latch Answered only while the same question is still current
        let mut acknowledged = false;
        self.state.update(|current| {
            let question = current.question.as_ref()?;
            if question.question.id != question_id {
                return None;
            }
            acknowledged = true;
            Some(RoomSnapshot {
                question: Some(CurrentQuestion {
                    phase: QuestionPhase::Answered,
                    pending_answer: None,
                    ..question.clone()
                }),
                ..current.clone()
            })
        });

        if acknowledged {
            self.dispatcher.emit(&RoomEvent::AnswerAcknowledged {
                participant_id: local_participant_id,
                question_id,
            });
        }
        Ok(())
    }

    /// Apply a `question_started` push.
    ///
    /// Replaces the current question and clears any pending local answer — a
    /// new question invalidates an answer still awaiting acknowledgment for
    /// the previous one. A local timer flips the phase to `TimedOut` when
    /// the question's time limit elapses unanswered.
    pub(crate) fn apply_question_started(&self, message: QuestionStartedMessage) {
        let question: Question = message.question.into();
        let question_for_event = question.clone();
        let started_at = self.clock.now_millis();

        let mut installed = false;
        self.state.update(|current| {
            let room = current.room.as_ref()?;
            if room.id != message.room_id {
                tracing::debug!(
                    "Dropping question_started for room {} (current room is {})",
                    message.room_id,
                    room.id
                );
                return None;
            }
            installed = true;
            Some(RoomSnapshot {
                question: Some(CurrentQuestion {
                    question: question.clone(),
                    phase: QuestionPhase::Active,
                    started_at,
                    pending_answer: None,
                }),
                ..current.clone()
            })
        });
        if !installed {
            return;
        }

        tracing::info!(
            "Question '{}' started ({} options, {}s limit)",
            question_for_event.id,
            question_for_event.options.len(),
            question_for_event.time_limit_secs
        );
        self.arm_question_timer(&question_for_event);
        self.dispatcher
            .emit(&RoomEvent::QuestionStarted(question_for_event));
    }

    /// Apply an `answer_received` push (some participant's answer reached
    /// the server).
    ///
    /// The local user's own acknowledgment is already emitted when the
    /// submit reply arrives, so a redundant push for an answered question is
    /// skipped.
    pub(crate) fn apply_answer_received(&self, message: AnswerReceivedMessage) {
        let snapshot = self.state.load();
        let Some(room) = snapshot.room.as_ref() else {
            return;
        };
        if room.id != message.room_id {
            tracing::debug!(
                "Dropping answer_received for room {} (current room is {})",
                message.room_id,
                room.id
            );
            return;
        }

        let is_own = snapshot.local_participant_id.as_deref() == Some(message.participant_id.as_str());
        let already_answered = snapshot
            .question
            .as_ref()
            .is_some_and(|q| q.question.id == message.question_id && q.phase == QuestionPhase::Answered);
        if is_own && already_answered {
            tracing::debug!("Skipping redundant answer_received for the local participant");
            return;
        }

        self.dispatcher.emit(&RoomEvent::AnswerAcknowledged {
            participant_id: message.participant_id,
            question_id: message.question_id,
        });
    }

    /// Apply a `leaderboard_updated` push: wholesale replacement in server
    /// order
    pub(crate) fn apply_leaderboard_updated(&self, message: LeaderboardUpdatedMessage) {
        let entries: Vec<LeaderboardEntry> =
            message.entries.into_iter().map(Into::into).collect();
        let entries_for_event = entries.clone();

        let mut replaced = false;
        self.state.update(|current| {
            let room = current.room.as_ref()?;
            if room.id != message.room_id {
                tracing::debug!(
                    "Dropping leaderboard_updated for room {} (current room is {})",
                    message.room_id,
                    room.id
                );
                return None;
            }
            replaced = true;
            Some(RoomSnapshot {
                leaderboard: entries,
                ..current.clone()
            })
        });

        if replaced {
            self.dispatcher
                .emit(&RoomEvent::LeaderboardUpdated(entries_for_event));
        }
    }

    /// Flip the question to `TimedOut` when its limit elapses unanswered.
    ///
    /// A limit of zero means no limit. The timer is defused by the question
    /// being answered or superseded before it fires.
    fn arm_question_timer(&self, question: &Question) {
        if question.time_limit_secs == 0 {
            return;
        }
        let state = Arc::clone(&self.state);
        let question_id = question.id.clone();
        let limit = Duration::from_secs(u64::from(question.time_limit_secs));
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            state.update(|current| {
                let current_question = current.question.as_ref()?;
                if current_question.question.id != question_id
                    || current_question.phase != QuestionPhase::Active
                {
                    return None;
                }
                tracing::debug!("Question '{}' timed out", question_id);
                Some(RoomSnapshot {
                    question: Some(CurrentQuestion {
                        phase: QuestionPhase::TimedOut,
                        pending_answer: None,
                        ..current_question.clone()
                    }),
                    ..current.clone()
                })
            });
        });
    }

    /// Record or clear the transient local answer for `question_id`
    fn set_pending_answer(&self, question_id: &str, answer: Option<Answer>) {
        self.state.update(|current| {
            let question = current.question.as_ref()?;
            if question.question.id != question_id {
                return None;
            }
            Some(RoomSnapshot {
                question: Some(CurrentQuestion {
                    pending_answer: answer,
                    ..question.clone()
                }),
                ..current.clone()
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RoomClientConfig;
    use crate::client::error::RequestError;
    use crate::common::time::FixedClock;
    use crate::domain::{EventKind, Participant, PresenceState, Role, Room, RoomStatus};
    use crate::infrastructure::transport::testing::{PeerSide, transport_pair};
    use crate::infrastructure::transport::{MockConnector, TransportError};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Fixture {
        quiz: Arc<QuizFlow>,
        state: Arc<SharedRoomState>,
        dispatcher: Arc<EventDispatcher>,
        connection: Arc<ConnectionManager>,
    }

    fn fixture() -> (Fixture, PeerSide) {
        let (transport, peer) = transport_pair();
        let prepared = Mutex::new(Some(transport));
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(move |_, _| match prepared.lock().unwrap().take() {
                Some(transport) => Ok(transport),
                None => Err(TransportError::Handshake("refused".to_string())),
            });

        let (server_tx, _server_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(EventDispatcher::new());
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(connector),
            server_tx,
            Arc::clone(&dispatcher),
            &RoomClientConfig::default(),
        ));
        let state = Arc::new(SharedRoomState::new());
        let quiz = Arc::new(QuizFlow::new(
            Arc::clone(&connection),
            Arc::clone(&state),
            Arc::clone(&dispatcher),
            Arc::new(FixedClock::new(1_700_000_000_000)),
        ));
        (
            Fixture {
                quiz,
                state,
                dispatcher,
                connection,
            },
            peer,
        )
    }

    fn install_room(state: &SharedRoomState) {
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
        participants.insert(me.id.clone(), me);
        state.update(move |_| {
            Some(RoomSnapshot {
                room: Some(Room {
                    id: "room-1".to_string(),
                    name: "Friday Quiz".to_string(),
                    join_code: "ABC123".to_string(),
                    status: RoomStatus::Active,
                    capacity: 30,
                    config: Default::default(),
                }),
                local_participant_id: Some("p1".to_string()),
                participants,
                ..RoomSnapshot::empty()
            })
        });
    }

    fn question_started(question_id: &str) -> QuestionStartedMessage {
        serde_json::from_str(&format!(
            r#"{{
                "type": "question_started",
                "room_id": "room-1",
                "question": {{
                    "id": "{question_id}", "prompt": "2 + 2 = ?",
                    "options": ["3", "4", "5"],
                    "time_limit_secs": 20, "points": 100
                }}
            }}"#
        ))
        .map(|message| match message {
            crate::infrastructure::dto::websocket::ServerMessage::QuestionStarted(m) => m,
            _ => panic!("expected question_started"),
        })
        .unwrap()
    }

    fn count_events(fixture: &Fixture, kind: EventKind) -> Arc<Mutex<Vec<RoomEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _ = fixture.dispatcher.subscribe(kind, move |event| {
            seen_clone.lock().unwrap().push(event.clone());
        });
        seen
    }

    #[tokio::test]
    async fn test_submit_without_question_fails_locally() {
        // テスト項目: 出題中の問題がない状態での submit_answer は NoActiveQuestion で失敗する
        // given (前提条件):
        let (fixture, _peer) = fixture();
        install_room(&fixture.state);

        // when (操作):
        let result = fixture.quiz.submit_answer("4", 3.0).await;

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), AnswerError::NoActiveQuestion);
    }

    #[tokio::test]
    async fn test_submit_acknowledged_latches_answered() {
        // テスト項目: 回答が承認されると Answered になり、再送は AlreadyAnswered で失敗する
        // given (前提条件):
        let (fixture, mut peer) = fixture();
        fixture.connection.connect("ws://test", "token").await.unwrap();
        install_room(&fixture.state);
        fixture.quiz.apply_question_started(question_started("q7"));
        let ack_events = count_events(&fixture, EventKind::AnswerAcknowledged);

        // when (操作):
        let quiz = Arc::clone(&fixture.quiz);
        let submit = tokio::spawn(async move { quiz.submit_answer("4", 3.2).await });
        let sent = peer.next_message().await;
        let ClientMessage::SubmitAnswer {
            seq, question_id, ..
        } = sent
        else {
            panic!("expected a submit_answer message");
        };
        assert_eq!(question_id, "q7");
        peer.push_reply(seq);
        submit.await.unwrap().unwrap();

        // then (期待する結果):
        let snapshot = fixture.state.load();
        let question = snapshot.question.as_ref().unwrap();
        assert_eq!(question.phase, QuestionPhase::Answered);
        assert!(question.pending_answer.is_none());
        assert_eq!(ack_events.lock().unwrap().len(), 1);

        let retry = fixture.quiz.submit_answer("4", 4.0).await;
        assert_eq!(retry.unwrap_err(), AnswerError::AlreadyAnswered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_timeout_allows_resubmission() {
        // テスト項目: 承認されないまま 10 秒経過した submit は RequestTimeout で失敗し、
        //             遅延 reply は無視され、同じ問題への再送が許可される
        // given (前提条件):
        let (fixture, mut peer) = fixture();
        fixture.connection.connect("ws://test", "token").await.unwrap();
        install_room(&fixture.state);
        fixture.quiz.apply_question_started(question_started("q7"));

        // when (操作): reply なしでタイムアウトさせる
        let result = fixture.quiz.submit_answer("optA", 12.4).await;

        // then (期待する結果):
        assert_eq!(
            result.unwrap_err(),
            AnswerError::Request(RequestError::RequestTimeout)
        );

        // when (操作): t=12s 相当で遅延 reply が届く
        let sent = peer.next_message().await;
        peer.push_reply(sent.seq().unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // then (期待する結果): Answered には遷移せず、再送できる
        let snapshot = fixture.state.load();
        assert_ne!(
            snapshot.question.as_ref().unwrap().phase,
            QuestionPhase::Answered
        );
        let quiz = Arc::clone(&fixture.quiz);
        let retry = tokio::spawn(async move { quiz.submit_answer("optA", 13.0).await });
        let sent = peer.next_message().await;
        peer.push_reply(sent.seq().unwrap());
        assert!(retry.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_new_question_replaces_current_and_clears_pending() {
        // テスト項目: 新しい question_started が現在の問題と保留中の回答を置き換える
        // given (前提条件):
        let (fixture, _peer) = fixture();
        install_room(&fixture.state);
        fixture.quiz.apply_question_started(question_started("q1"));
        fixture.state.update(|current| {
            let question = current.question.as_ref()?;
            Some(RoomSnapshot {
                question: Some(CurrentQuestion {
                    pending_answer: Some(Answer {
                        question_id: "q1".to_string(),
                        selected_option: "3".to_string(),
                        elapsed_secs: 1.0,
                    }),
                    ..question.clone()
                }),
                ..current.clone()
            })
        });
        let started_events = count_events(&fixture, EventKind::QuestionStarted);

        // when (操作):
        fixture.quiz.apply_question_started(question_started("q2"));

        // then (期待する結果):
        let snapshot = fixture.state.load();
        let question = snapshot.question.as_ref().unwrap();
        assert_eq!(question.question.id, "q2");
        assert_eq!(question.phase, QuestionPhase::Active);
        assert!(question.pending_answer.is_none());
        assert_eq!(started_events.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_question_times_out_locally() {
        // テスト項目: 制限時間が経過すると未回答の問題は TimedOut に遷移する
        // given (前提条件):
        let (fixture, _peer) = fixture();
        install_room(&fixture.state);
        fixture.quiz.apply_question_started(question_started("q7"));

        // when (操作): 制限時間 (20 秒) を経過させる
        tokio::time::sleep(Duration::from_secs(21)).await;

        // then (期待する結果):
        let snapshot = fixture.state.load();
        assert_eq!(
            snapshot.question.as_ref().unwrap().phase,
            QuestionPhase::TimedOut
        );
    }

    #[tokio::test]
    async fn test_leaderboard_replaced_in_server_order() {
        // テスト項目: leaderboard_updated はサーバーの順序のまま全置換され、並べ替えは行わない
        // given (前提条件):
        let (fixture, _peer) = fixture();
        install_room(&fixture.state);
        let updated_events = count_events(&fixture, EventKind::LeaderboardUpdated);
        let message: LeaderboardUpdatedMessage = serde_json::from_str(
            r#"{
                "room_id": "room-1",
                "entries": [
                    {"participant_id": "p2", "score": 300, "rank": 1},
                    {"participant_id": "p1", "score": 150, "rank": 2}
                ]
            }"#,
        )
        .unwrap();

        // when (操作):
        fixture.quiz.apply_leaderboard_updated(message);

        // then (期待する結果):
        let snapshot = fixture.state.load();
        let ids: Vec<&str> = snapshot
            .leaderboard
            .iter()
            .map(|entry| entry.participant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(updated_events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_question_for_other_room_is_dropped() {
        // テスト項目: 現在の Room と異なる room_id の question_started は破棄される
        // given (前提条件):
        let (fixture, _peer) = fixture();
        install_room(&fixture.state);
        let mut message = question_started("q9");
        message.room_id = "room-OLD".to_string();

        // when (操作):
        fixture.quiz.apply_question_started(message);

        // then (期待する結果):
        assert!(fixture.state.load().question.is_none());
    }

    #[tokio::test]
    async fn test_answer_received_for_other_participant_emits_event() {
        // テスト項目: 他の参加者の answer_received が answerAcknowledged として発火する
        // given (前提条件):
        let (fixture, _peer) = fixture();
        install_room(&fixture.state);
        fixture.quiz.apply_question_started(question_started("q7"));
        let ack_events = count_events(&fixture, EventKind::AnswerAcknowledged);

        // when (操作):
        fixture.quiz.apply_answer_received(AnswerReceivedMessage {
            room_id: "room-1".to_string(),
            question_id: "q7".to_string(),
            participant_id: "p2".to_string(),
            correct: Some(true),
            awarded_points: Some(100),
        });

        // then (期待する結果):
        let acks = ack_events.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert!(matches!(
            &acks[0],
            RoomEvent::AnswerAcknowledged { participant_id, .. } if participant_id == "p2"
        ));
    }
}
