use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::bridge::{ClusterBridge, NoBridge, NoPush, OfflinePush};
use crate::channels::ChatChannels;
use crate::error::{DeliveryError, DeliveryResult};
use crate::events::ServerEvent;
use crate::model::{ChatStatus, MessageContent, StoredMessage};
use crate::presence::{ConnectionHandle, PresenceRegistry};
use crate::reconciler::Reconciler;
use crate::store::{ChatDirectory, MessageStore};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes inbound real-time events to persistence and to the right set of
/// live connections. Owns the presence registry and the channel index for
/// the lifetime of the process.
pub struct DeliveryRouter {
    presence: PresenceRegistry,
    channels: ChatChannels,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn ChatDirectory>,
    reconciler: Reconciler,
    /// One async lock per chat. `send_message` and `mark_read` on the same
    /// chat serialize here; unrelated chats never contend.
    chat_locks: DashMap<String, Arc<Mutex<()>>>,
    bridge: Arc<dyn ClusterBridge>,
    push: Arc<dyn OfflinePush>,
    store_timeout: Duration,
}

impl DeliveryRouter {
    pub fn new(store: Arc<dyn MessageStore>, directory: Arc<dyn ChatDirectory>) -> Self {
        let reconciler = Reconciler::new(store.clone(), directory.clone());
        Self {
            presence: PresenceRegistry::new(),
            channels: ChatChannels::new(),
            store,
            directory,
            reconciler,
            chat_locks: DashMap::new(),
            bridge: Arc::new(NoBridge),
            push: Arc::new(NoPush),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound on every store/directory round trip.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn ClusterBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_offline_push(mut self, push: Arc<dyn OfflinePush>) -> Self {
        self.push = push;
        self
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Adds the connection to the chat channel. Idempotent.
    pub fn join(&self, handle: &ConnectionHandle, chat_id: &str) {
        self.channels.join(chat_id, handle);
    }

    /// Removes the connection from the chat channel. Idempotent.
    pub fn leave(&self, handle: &ConnectionHandle, chat_id: &str) {
        self.channels.leave(chat_id, handle);
    }

    /// Tears down a closed connection: every channel membership goes, then
    /// the presence entry. Durable chat state is untouched.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        self.channels.leave_all(handle);
        self.presence.unregister(handle);
    }

    fn chat_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        self.chat_locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = DeliveryResult<T>>,
    ) -> DeliveryResult<T> {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::PersistenceTimeout(self.store_timeout)),
        }
    }

    /// Persist-then-fan-out send path, serialized per chat.
    ///
    /// The message reaches every connection joined to the chat (the sender's
    /// own included, for multi-device sync), and every live connection of
    /// each non-sender participant gets a notification whether or not it has
    /// the chat open. Nothing is delivered unless the append succeeded.
    pub async fn send_message(
        &self,
        handle: &ConnectionHandle,
        chat_id: &str,
        content: MessageContent,
    ) -> DeliveryResult<StoredMessage> {
        let sender_id = handle.user_id();

        let session = self.bounded(self.directory.session(chat_id)).await?;
        if !session.is_participant(sender_id) {
            return Err(DeliveryError::NotParticipant {
                chat_id: chat_id.to_string(),
                user_id: sender_id.to_string(),
            });
        }
        if session.status != ChatStatus::Active {
            return Err(DeliveryError::ChatClosed(chat_id.to_string()));
        }

        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;

        let message = self
            .bounded(self.store.append(chat_id, sender_id, content))
            .await?;

        let broadcast = ServerEvent::NewMessage {
            message: message.clone(),
        };
        if let Some(frame) = broadcast.encode() {
            for member in self.channels.members(chat_id) {
                member.send(&frame);
            }
            self.bridge.publish_to_chat(chat_id, &frame);
        }

        let notification = ServerEvent::MessageNotification {
            chat_id: chat_id.to_string(),
            message: message.clone(),
        };
        if let Some(frame) = notification.encode() {
            for participant in session.participants.iter().filter(|p| *p != sender_id) {
                let live = self.presence.connections_for(participant);
                if live.is_empty() {
                    self.push.notify(participant, chat_id, &message);
                }
                for conn in live {
                    conn.send(&frame);
                }
                self.bridge.publish_to_user(participant, &frame);
            }
        }

        if let Err(e) = self
            .bounded(
                self.reconciler
                    .increment_unread(chat_id, sender_id, &message.id),
            )
            .await
        {
            // The message itself is durable; a missed increment settles on
            // the recipient's next mark_read recompute.
            warn!(
                "Unread increment failed for chat {} after message {}: {}",
                chat_id, message.id, e
            );
        }

        Ok(message)
    }

    /// Best-effort typing signal: no persistence, no locks, no delivery
    /// guarantee, and never echoed to the sender's own connections.
    pub fn typing(&self, handle: &ConnectionHandle, chat_id: &str) {
        self.volatile(
            handle,
            chat_id,
            ServerEvent::UserTyping {
                chat_id: chat_id.to_string(),
                user_id: handle.user_id().to_string(),
            },
        );
    }

    pub fn stop_typing(&self, handle: &ConnectionHandle, chat_id: &str) {
        self.volatile(
            handle,
            chat_id,
            ServerEvent::UserStoppedTyping {
                chat_id: chat_id.to_string(),
                user_id: handle.user_id().to_string(),
            },
        );
    }

    fn volatile(&self, handle: &ConnectionHandle, chat_id: &str, event: ServerEvent) {
        if let Some(frame) = event.encode() {
            for member in self.channels.members(chat_id) {
                if member.user_id() != handle.user_id() {
                    member.send(&frame);
                }
            }
            self.bridge.publish_to_chat(chat_id, &frame);
        }
    }

    /// Settles read state for the caller, then tells every connection joined
    /// to the chat so read status updates live. Serialized against sends on
    /// the same chat; a message sent after this began is never marked by it.
    pub async fn mark_read(&self, handle: &ConnectionHandle, chat_id: &str) -> DeliveryResult<usize> {
        let user_id = handle.user_id();

        let session = self.bounded(self.directory.session(chat_id)).await?;
        if !session.is_participant(user_id) {
            return Err(DeliveryError::NotParticipant {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;

        let marked = self
            .bounded(self.reconciler.mark_read(chat_id, user_id))
            .await?;

        let receipt = ServerEvent::MessagesRead {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        };
        if let Some(frame) = receipt.encode() {
            for member in self.channels.members(chat_id) {
                member.send(&frame);
            }
            self.bridge.publish_to_chat(chat_id, &frame);
        }

        Ok(marked)
    }
}
