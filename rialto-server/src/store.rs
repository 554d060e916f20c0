use async_trait::async_trait;

use crate::error::DeliveryResult;
use crate::model::{ChatSession, DeliveryStatus, MessageContent, ParticipantPair, StoredMessage};

/// Durable, per-chat-ordered message log. The delivery core only ever talks
/// to persistence through this interface; a database-backed implementation
/// drops in behind the same trait.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message to the chat's log with status `Sent`. Must be
    /// atomic per chat: two concurrent appends to the same chat never
    /// interleave or lose an entry.
    async fn append(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: MessageContent,
    ) -> DeliveryResult<StoredMessage>;

    /// Records that `user_id` read the message. Markers are monotonic: once
    /// present, never removed or duplicated, and never added for the sender.
    async fn add_read_marker(
        &self,
        message_id: &str,
        user_id: &str,
        read_at: i64,
    ) -> DeliveryResult<()>;

    async fn set_status(&self, message_id: &str, status: DeliveryStatus) -> DeliveryResult<()>;

    /// Messages in `chat_id` not sent by `user_id` and without a read marker
    /// from them, oldest first.
    async fn list_unread_for(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> DeliveryResult<Vec<StoredMessage>>;
}

/// Durable chat records: participants, status, unread counters, last-message
/// pointer.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn session(&self, chat_id: &str) -> DeliveryResult<ChatSession>;

    async fn participants(&self, chat_id: &str) -> DeliveryResult<Vec<String>>;

    /// Atomically adds `delta` to the participant's unread counter. Must not
    /// lose updates under concurrent calls for the same chat.
    async fn increment_unread(&self, chat_id: &str, user_id: &str, delta: u64)
        -> DeliveryResult<()>;

    async fn set_unread(&self, chat_id: &str, user_id: &str, value: u64) -> DeliveryResult<()>;

    async fn set_last_message(&self, chat_id: &str, message_id: &str) -> DeliveryResult<()>;

    /// Returns the active session for `{listing, pair}`, creating it exactly
    /// once. Concurrent calls for the same key must all observe the same
    /// session; re-requesting while active never creates a duplicate.
    async fn get_or_create(
        &self,
        listing_id: &str,
        pair: ParticipantPair,
    ) -> DeliveryResult<ChatSession>;
}
