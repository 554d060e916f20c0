use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current unix timestamp in milliseconds, the resolution used for all
/// persisted timestamps.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle state of a chat session. Sessions are never deleted, only
/// archived or blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Archived,
    Blocked,
}

/// Delivery state of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Message payload. A closed set of variants, not free-form content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageContent {
    Text { body: String },
    Image { url: String },
    Location { latitude: f64, longitude: f64 },
}

/// Durable record that a specific user has read a specific message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadMarker {
    pub user_id: String,
    pub read_at: i64,
}

/// A persisted chat message. Mutated only to append read markers or advance
/// the delivery status; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: MessageContent,
    pub read_by: Vec<ReadMarker>,
    pub status: DeliveryStatus,
    pub created_at: i64,
}

impl StoredMessage {
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|marker| marker.user_id == user_id)
    }
}

/// Unordered pair of chat participants. Normalized so the same two users
/// always produce the same pair regardless of argument order, which is what
/// makes the `{listing, pair}` dedup key stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    first: String,
    second: String,
}

impl ParticipantPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.first == user_id || self.second == user_id
    }

    pub fn users(&self) -> [&str; 2] {
        [&self.first, &self.second]
    }
}

/// A conversation between exactly two users about one listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub listing_id: String,
    /// Exactly two user ids, fixed at creation.
    pub participants: Vec<String>,
    pub status: ChatStatus,
    pub last_message_id: Option<String>,
    /// Unread counter per participant. Keys are exactly the participant set.
    pub unread: HashMap<String, u64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatSession {
    pub fn new(listing_id: impl Into<String>, pair: &ParticipantPair) -> Self {
        let participants: Vec<String> = pair.users().iter().map(|u| u.to_string()).collect();
        let unread = participants.iter().map(|u| (u.clone(), 0)).collect();
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            listing_id: listing_id.into(),
            participants,
            status: ChatStatus::Active,
            last_message_id: None,
            unread,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn unread_for(&self, user_id: &str) -> u64 {
        self.unread.get(user_id).copied().unwrap_or(0)
    }
}
