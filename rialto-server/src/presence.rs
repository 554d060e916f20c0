use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Outbound handle for one live WebSocket connection. Cloneable; all clones
/// feed the same writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    user_id: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queues a frame on the connection's writer task. Returns false when
    /// the connection is already gone; callers treat that as best-effort.
    pub fn send(&self, frame: &str) -> bool {
        self.tx.send(frame.to_string()).is_ok()
    }
}

/// In-memory directory of live connections per user. Process-local, rebuilt
/// from connect/disconnect traffic, and deliberately ignorant of chats.
/// Supports multiple simultaneous connections per user (multi-device).
pub struct PresenceRegistry {
    connections: DashMap<String, Vec<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a freshly authenticated connection and returns its handle.
    pub fn register(&self, user_id: &str, tx: mpsc::UnboundedSender<String>) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user_id: user_id.to_string(),
            tx,
        };
        self.connections
            .entry(user_id.to_string())
            .or_default()
            .push(handle.clone());
        handle
    }

    /// Removes one connection; the user entry disappears with its last
    /// handle. Unregistering an already-removed handle is a no-op.
    pub fn unregister(&self, handle: &ConnectionHandle) {
        if let Some(mut entry) = self.connections.get_mut(handle.user_id()) {
            entry.retain(|h| h.id != handle.id);
        }
        self.connections
            .remove_if(handle.user_id(), |_, handles| handles.is_empty());
    }

    /// Every live connection for a user; empty when the user is offline.
    /// Never blocks.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.connections
            .get(user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|handles| !handles.is_empty())
            .unwrap_or(false)
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
