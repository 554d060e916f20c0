//! Real-time chat delivery core for the Rialto marketplace backend.
//!
//! Fans chat messages out to connected participants, tracks per-user
//! presence, and keeps per-chat unread counters consistent with the
//! persisted message log under concurrent writers. Persistence itself lives
//! behind the [`MessageStore`] and [`ChatDirectory`] traits.

mod bridge;
mod channels;
mod connection;
mod error;
mod events;
mod memory;
mod model;
mod presence;
mod reconciler;
mod router;
mod store;

pub use bridge::{ClusterBridge, NoBridge, NoPush, OfflinePush};
pub use channels::ChatChannels;
pub use connection::handle_connection;
pub use error::{DeliveryError, DeliveryResult};
pub use events::{ClientEvent, ServerEvent};
pub use memory::{MemoryChatDirectory, MemoryMessageStore};
pub use model::{
    ChatSession, ChatStatus, DeliveryStatus, MessageContent, ParticipantPair, ReadMarker,
    StoredMessage,
};
pub use presence::{ConnectionHandle, PresenceRegistry};
pub use reconciler::Reconciler;
pub use router::DeliveryRouter;
pub use store::{ChatDirectory, MessageStore};
