use std::time::Duration;

use thiserror::Error;

/// Failures surfaced to the connection that initiated an operation. They are
/// never broadcast to other participants and never abort unrelated in-flight
/// work; a failed send leaves the chat unchanged and is safely retryable.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("chat {0} not found")]
    ChatNotFound(String),
    #[error("user {user_id} is not a participant of chat {chat_id}")]
    NotParticipant { chat_id: String, user_id: String },
    #[error("chat {0} no longer accepts messages")]
    ChatClosed(String),
    #[error("store operation timed out after {0:?}")]
    PersistenceTimeout(Duration),
    #[error("store operation failed: {0}")]
    PersistenceFailure(String),
}

impl DeliveryError {
    /// Stable reason code carried in `send_failed` events so clients can
    /// decide whether to retry.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ChatNotFound(_) => "chat_not_found",
            Self::NotParticipant { .. } => "not_participant",
            Self::ChatClosed(_) => "chat_closed",
            Self::PersistenceTimeout(_) => "persistence_timeout",
            Self::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
