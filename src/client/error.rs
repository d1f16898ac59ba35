//! Error types returned to callers of the sync layer.
//!
//! Errors for caller-initiated actions (join, answer submission) are always
//! returned as values, never panicked, so presentation code can render inline
//! feedback. Ambient connection failures are not represented here; they are
//! surfaced through `ConnectionStateChanged` events.

use thiserror::Error;

use crate::infrastructure::dto::websocket::{
    ERROR_CODE_INVALID_CODE, ERROR_CODE_ROOM_FINISHED, ERROR_CODE_ROOM_FULL, ErrorDetail,
};

/// Errors for a correlated request/reply exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    /// No connection to the room coordination service
    #[error("not connected to the room coordination service")]
    NotConnected,

    /// The connection dropped while the request was awaiting its reply
    #[error("connection lost while awaiting a reply")]
    ConnectionLost,

    /// No reply arrived within the timeout window
    #[error("request timed out")]
    RequestTimeout,
}

/// Failures of a `join_room` request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Another join request is still awaiting its reply
    #[error("a join request is already in progress")]
    AlreadyInProgress,

    /// The server rejected the access code
    #[error("invalid access code")]
    InvalidCode,

    /// The room is at capacity
    #[error("room is full")]
    RoomFull,

    /// The quiz in this room has already finished
    #[error("room has already finished")]
    RoomFinished,

    /// Server-declared rejection without a recognized code
    #[error("join rejected: {0}")]
    Rejected(String),

    /// Transport-level failure of the underlying request
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl JoinError {
    /// Map a server-declared rejection to the matching variant
    pub(crate) fn from_rejection(error: Option<ErrorDetail>) -> Self {
        let Some(detail) = error else {
            return JoinError::Rejected("join rejected without details".to_string());
        };
        match detail.code.as_deref() {
            Some(ERROR_CODE_INVALID_CODE) => JoinError::InvalidCode,
            Some(ERROR_CODE_ROOM_FULL) => JoinError::RoomFull,
            Some(ERROR_CODE_ROOM_FINISHED) => JoinError::RoomFinished,
            _ => JoinError::Rejected(detail.message),
        }
    }
}

/// Failures of a `submit_answer` request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    /// There is no current question to answer
    #[error("no question is currently active")]
    NoActiveQuestion,

    /// The current question already has an acknowledged answer
    #[error("the current question has already been answered")]
    AlreadyAnswered,

    /// Server-declared rejection of the answer
    #[error("answer rejected: {0}")]
    Rejected(String),

    /// Transport-level failure of the underlying request
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Failures of a fire-and-forget room message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The local user is not inside a room
    #[error("not currently in a room")]
    NotInRoom,

    /// Transport-level failure of the underlying send
    #[error(transparent)]
    Request(#[from] RequestError),
}
