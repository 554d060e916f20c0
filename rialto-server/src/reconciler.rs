use std::sync::Arc;

use crate::error::DeliveryResult;
use crate::model::{now_millis, DeliveryStatus};
use crate::store::{ChatDirectory, MessageStore};

/// Applies read-state transitions across the message store and the chat
/// directory, keeping unread counters consistent with the marked-unread
/// messages they track.
pub struct Reconciler {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn ChatDirectory>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn MessageStore>, directory: Arc<dyn ChatDirectory>) -> Self {
        Self { store, directory }
    }

    /// Durable side effects of a newly persisted message: the last-message
    /// pointer moves, and every participant except the sender gains one
    /// unread. Increments go through the directory's atomic primitive so
    /// back-to-back sends never lose an update.
    pub async fn increment_unread(
        &self,
        chat_id: &str,
        exclude_user_id: &str,
        message_id: &str,
    ) -> DeliveryResult<()> {
        self.directory.set_last_message(chat_id, message_id).await?;
        for participant in self.directory.participants(chat_id).await? {
            if participant != exclude_user_id {
                self.directory
                    .increment_unread(chat_id, &participant, 1)
                    .await?;
            }
        }
        Ok(())
    }

    /// Marks every message currently unread by `user_id` as read, then
    /// settles the unread counter. Returns the number of messages marked.
    ///
    /// The counter is recomputed from the store rather than written as a
    /// literal zero: a message persisted while the batch was being marked is
    /// not in the batch, and recounting keeps it counted instead of
    /// clobbering its increment.
    pub async fn mark_read(&self, chat_id: &str, user_id: &str) -> DeliveryResult<usize> {
        let batch = self.store.list_unread_for(chat_id, user_id).await?;
        let read_at = now_millis();

        for message in &batch {
            self.store
                .add_read_marker(&message.id, user_id, read_at)
                .await?;
            if message.status != DeliveryStatus::Read {
                self.store
                    .set_status(&message.id, DeliveryStatus::Read)
                    .await?;
            }
        }

        let remaining = self.store.list_unread_for(chat_id, user_id).await?.len() as u64;
        self.directory.set_unread(chat_id, user_id, remaining).await?;

        Ok(batch.len())
    }
}
