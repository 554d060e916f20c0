use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{DeliveryError, DeliveryResult};
use crate::model::{
    now_millis, ChatSession, ChatStatus, DeliveryStatus, MessageContent, ParticipantPair,
    ReadMarker, StoredMessage,
};
use crate::store::{ChatDirectory, MessageStore};

/// In-memory message log. Backs the binary and the test suite; a database
/// implementation replaces it behind the [`MessageStore`] trait.
pub struct MemoryMessageStore {
    messages: DashMap<String, StoredMessage>,
    /// Append order per chat. The entry lock serializes appends for a chat.
    by_chat: DashMap<String, Vec<String>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
            by_chat: DashMap::new(),
        }
    }

    /// Full log for a chat in append order.
    pub fn messages_for(&self, chat_id: &str) -> Vec<StoredMessage> {
        let ids = self
            .by_chat
            .get(chat_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.messages.get(id).map(|m| m.clone()))
            .collect()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: MessageContent,
    ) -> DeliveryResult<StoredMessage> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content,
            read_by: Vec::new(),
            status: DeliveryStatus::Sent,
            created_at: now_millis(),
        };

        // Insert the record before publishing its id so readers of the chat
        // log never observe a dangling entry.
        self.messages.insert(message.id.clone(), message.clone());
        self.by_chat
            .entry(chat_id.to_string())
            .or_default()
            .push(message.id.clone());

        Ok(message)
    }

    async fn add_read_marker(
        &self,
        message_id: &str,
        user_id: &str,
        read_at: i64,
    ) -> DeliveryResult<()> {
        let mut message = self.messages.get_mut(message_id).ok_or_else(|| {
            DeliveryError::PersistenceFailure(format!("unknown message {}", message_id))
        })?;

        // Markers never name the sender and never duplicate.
        if message.sender_id == user_id || message.is_read_by(user_id) {
            return Ok(());
        }
        message.read_by.push(ReadMarker {
            user_id: user_id.to_string(),
            read_at,
        });
        Ok(())
    }

    async fn set_status(&self, message_id: &str, status: DeliveryStatus) -> DeliveryResult<()> {
        let mut message = self.messages.get_mut(message_id).ok_or_else(|| {
            DeliveryError::PersistenceFailure(format!("unknown message {}", message_id))
        })?;
        message.status = status;
        Ok(())
    }

    async fn list_unread_for(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> DeliveryResult<Vec<StoredMessage>> {
        Ok(self
            .messages_for(chat_id)
            .into_iter()
            .filter(|m| m.sender_id != user_id && !m.is_read_by(user_id))
            .collect())
    }
}

/// In-memory chat directory with the `{listing, unordered pair}` dedup index.
pub struct MemoryChatDirectory {
    sessions: DashMap<String, ChatSession>,
    index: DashMap<(String, ParticipantPair), String>,
}

impl MemoryChatDirectory {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            index: DashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Moves a session to a new lifecycle state. Archived and blocked
    /// sessions stop accepting messages.
    pub fn set_status(&self, chat_id: &str, status: ChatStatus) -> DeliveryResult<()> {
        let mut session = self
            .sessions
            .get_mut(chat_id)
            .ok_or_else(|| DeliveryError::ChatNotFound(chat_id.to_string()))?;
        session.status = status;
        session.updated_at = now_millis();
        Ok(())
    }
}

impl Default for MemoryChatDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatDirectory for MemoryChatDirectory {
    async fn session(&self, chat_id: &str) -> DeliveryResult<ChatSession> {
        self.sessions
            .get(chat_id)
            .map(|s| s.clone())
            .ok_or_else(|| DeliveryError::ChatNotFound(chat_id.to_string()))
    }

    async fn participants(&self, chat_id: &str) -> DeliveryResult<Vec<String>> {
        self.session(chat_id).await.map(|s| s.participants)
    }

    async fn increment_unread(
        &self,
        chat_id: &str,
        user_id: &str,
        delta: u64,
    ) -> DeliveryResult<()> {
        let mut session = self
            .sessions
            .get_mut(chat_id)
            .ok_or_else(|| DeliveryError::ChatNotFound(chat_id.to_string()))?;

        // Counter keys are exactly the participant set; unknown users are
        // rejected rather than inserted.
        match session.unread.get_mut(user_id) {
            Some(count) => {
                *count += delta;
                session.updated_at = now_millis();
                Ok(())
            }
            None => Err(DeliveryError::NotParticipant {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            }),
        }
    }

    async fn set_unread(&self, chat_id: &str, user_id: &str, value: u64) -> DeliveryResult<()> {
        let mut session = self
            .sessions
            .get_mut(chat_id)
            .ok_or_else(|| DeliveryError::ChatNotFound(chat_id.to_string()))?;

        match session.unread.get_mut(user_id) {
            Some(count) => {
                *count = value;
                session.updated_at = now_millis();
                Ok(())
            }
            None => Err(DeliveryError::NotParticipant {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            }),
        }
    }

    async fn set_last_message(&self, chat_id: &str, message_id: &str) -> DeliveryResult<()> {
        let mut session = self
            .sessions
            .get_mut(chat_id)
            .ok_or_else(|| DeliveryError::ChatNotFound(chat_id.to_string()))?;
        session.last_message_id = Some(message_id.to_string());
        session.updated_at = now_millis();
        Ok(())
    }

    async fn get_or_create(
        &self,
        listing_id: &str,
        pair: ParticipantPair,
    ) -> DeliveryResult<ChatSession> {
        let key = (listing_id.to_string(), pair.clone());

        // The index entry lock makes the check-then-create atomic per key, so
        // concurrent calls for the same {listing, pair} all land on one
        // session.
        let chat_id = match self.index.entry(key) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get().clone();
                let active = self
                    .sessions
                    .get(&existing)
                    .map(|s| s.status == ChatStatus::Active)
                    .unwrap_or(false);
                if active {
                    existing
                } else {
                    // The prior session was archived or blocked; a new
                    // conversation starts fresh.
                    let session = ChatSession::new(listing_id, &pair);
                    let chat_id = session.id.clone();
                    self.sessions.insert(chat_id.clone(), session);
                    entry.insert(chat_id.clone());
                    chat_id
                }
            }
            Entry::Vacant(entry) => {
                let session = ChatSession::new(listing_id, &pair);
                let chat_id = session.id.clone();
                self.sessions.insert(chat_id.clone(), session);
                entry.insert(chat_id.clone());
                chat_id
            }
        };

        self.session(&chat_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> MessageContent {
        MessageContent::Text {
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_preserves_per_chat_order() {
        let store = MemoryMessageStore::new();

        let m1 = store.append("c1", "alice", text("first")).await.unwrap();
        let m2 = store.append("c1", "alice", text("second")).await.unwrap();
        store.append("c2", "alice", text("other chat")).await.unwrap();

        let log = store.messages_for("c1");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, m1.id);
        assert_eq!(log[1].id, m2.id);
        assert_eq!(log[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_read_markers_are_monotonic_and_never_name_the_sender() {
        let store = MemoryMessageStore::new();
        let message = store.append("c1", "alice", text("hello")).await.unwrap();

        // Marking twice keeps a single marker.
        store.add_read_marker(&message.id, "bob", 10).await.unwrap();
        store.add_read_marker(&message.id, "bob", 20).await.unwrap();

        // The sender never gets a marker.
        store
            .add_read_marker(&message.id, "alice", 30)
            .await
            .unwrap();

        let log = store.messages_for("c1");
        assert_eq!(log[0].read_by.len(), 1);
        assert_eq!(log[0].read_by[0].user_id, "bob");
        assert_eq!(log[0].read_by[0].read_at, 10);
    }

    #[tokio::test]
    async fn test_list_unread_excludes_own_and_marked_messages() {
        let store = MemoryMessageStore::new();

        let from_alice = store.append("c1", "alice", text("one")).await.unwrap();
        store.append("c1", "alice", text("two")).await.unwrap();
        store.append("c1", "bob", text("mine")).await.unwrap();

        store
            .add_read_marker(&from_alice.id, "bob", 10)
            .await
            .unwrap();

        let unread = store.list_unread_for("c1", "bob").await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(
            unread[0].content,
            MessageContent::Text {
                body: "two".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_get_or_create_dedups_by_listing_and_pair() {
        let directory = MemoryChatDirectory::new();

        let first = directory
            .get_or_create("listing-1", ParticipantPair::new("alice", "bob"))
            .await
            .unwrap();
        // Reversed pair order must land on the same session.
        let second = directory
            .get_or_create("listing-1", ParticipantPair::new("bob", "alice"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(directory.session_count(), 1);

        // A different listing gets its own session.
        let other = directory
            .get_or_create("listing-2", ParticipantPair::new("alice", "bob"))
            .await
            .unwrap();
        assert_ne!(first.id, other.id);
        assert_eq!(directory.session_count(), 2);
    }

    #[tokio::test]
    async fn test_get_or_create_concurrent_calls_converge() {
        let directory = std::sync::Arc::new(MemoryChatDirectory::new());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let directory = directory.clone();
            handles.push(tokio::spawn(async move {
                directory
                    .get_or_create("listing-1", ParticipantPair::new("alice", "bob"))
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(directory.session_count(), 1);
    }

    #[tokio::test]
    async fn test_archived_session_is_replaced_on_next_request() {
        let directory = MemoryChatDirectory::new();
        let pair = ParticipantPair::new("alice", "bob");

        let first = directory.get_or_create("listing-1", pair.clone()).await.unwrap();
        directory.set_status(&first.id, ChatStatus::Archived).unwrap();

        let second = directory.get_or_create("listing-1", pair).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.status, ChatStatus::Active);

        // The archived session survives; nothing is deleted.
        assert_eq!(directory.session_count(), 2);
    }

    #[tokio::test]
    async fn test_unread_counters_reject_non_participants() {
        let directory = MemoryChatDirectory::new();
        let session = directory
            .get_or_create("listing-1", ParticipantPair::new("alice", "bob"))
            .await
            .unwrap();

        directory.increment_unread(&session.id, "bob", 1).await.unwrap();
        let err = directory
            .increment_unread(&session.id, "stranger", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotParticipant { .. }));

        let session = directory.session(&session.id).await.unwrap();
        assert_eq!(session.unread_for("bob"), 1);
        assert_eq!(session.unread_for("alice"), 0);
    }

    #[tokio::test]
    async fn test_missing_chat_is_reported_as_not_found() {
        let directory = MemoryChatDirectory::new();
        let err = directory.session("nope").await.unwrap_err();
        assert!(matches!(err, DeliveryError::ChatNotFound(_)));
    }
}
