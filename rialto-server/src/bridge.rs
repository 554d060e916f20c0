use crate::model::StoredMessage;

/// Cross-instance fan-out seam. The presence registry is process-local, so a
/// multi-instance deployment must relay frames through a shared pub/sub
/// backend to reach connections registered on other processes. The router
/// publishes every chat-scoped and user-scoped frame here after local
/// delivery; a single-instance deployment uses [`NoBridge`].
pub trait ClusterBridge: Send + Sync {
    fn publish_to_chat(&self, chat_id: &str, frame: &str);
    fn publish_to_user(&self, user_id: &str, frame: &str);
}

/// Single-process deployment: nothing to relay.
pub struct NoBridge;

impl ClusterBridge for NoBridge {
    fn publish_to_chat(&self, _chat_id: &str, _frame: &str) {}
    fn publish_to_user(&self, _user_id: &str, _frame: &str) {}
}

/// Hook invoked when a message lands for a participant with zero live
/// connections. Actual push delivery (APNs, FCM, email digests) lives
/// outside this crate.
pub trait OfflinePush: Send + Sync {
    fn notify(&self, user_id: &str, chat_id: &str, message: &StoredMessage);
}

/// Default hook: offline recipients pick the message up from the store on
/// their next sync.
pub struct NoPush;

impl OfflinePush for NoPush {
    fn notify(&self, _user_id: &str, _chat_id: &str, _message: &StoredMessage) {}
}
