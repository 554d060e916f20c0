use dashmap::DashMap;

use crate::presence::ConnectionHandle;

/// Index of live connections joined to each chat channel. A connection may
/// be joined to any number of chats at once; membership is keyed by the
/// connection, not the user, so one device can follow a chat while another
/// stays on the inbox view.
pub struct ChatChannels {
    members: DashMap<String, Vec<ConnectionHandle>>,
}

impl ChatChannels {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
        }
    }

    /// Idempotent: joining a chat twice keeps a single membership.
    pub fn join(&self, chat_id: &str, handle: &ConnectionHandle) {
        let mut entry = self.members.entry(chat_id.to_string()).or_default();
        if !entry.iter().any(|h| h.id() == handle.id()) {
            entry.push(handle.clone());
        }
    }

    /// Idempotent: leaving a chat the connection never joined is a no-op.
    pub fn leave(&self, chat_id: &str, handle: &ConnectionHandle) {
        if let Some(mut entry) = self.members.get_mut(chat_id) {
            entry.retain(|h| h.id() != handle.id());
        }
        self.members.remove_if(chat_id, |_, handles| handles.is_empty());
    }

    /// Every connection currently joined to the chat.
    pub fn members(&self, chat_id: &str) -> Vec<ConnectionHandle> {
        self.members
            .get(chat_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Drops the connection from every channel it joined. Called once on
    /// disconnect.
    pub fn leave_all(&self, handle: &ConnectionHandle) {
        self.members.retain(|_, handles| {
            handles.retain(|h| h.id() != handle.id());
            !handles.is_empty()
        });
    }
}

impl Default for ChatChannels {
    fn default() -> Self {
        Self::new()
    }
}
