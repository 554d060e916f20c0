use serde::{Deserialize, Serialize};
use tracing::error;

use crate::model::{MessageContent, StoredMessage};

/// Events a client may send over its WebSocket connection. `connect` must be
/// the first frame; everything else is accepted only after authentication.
/// User identity is always taken from the authenticated connection, never
/// from the frame itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Connect {
        user_id: String,
        #[serde(default)]
        token: Option<String>,
    },
    JoinChat {
        chat_id: String,
    },
    LeaveChat {
        chat_id: String,
    },
    SendMessage {
        chat_id: String,
        content: MessageContent,
    },
    Typing {
        chat_id: String,
    },
    StopTyping {
        chat_id: String,
    },
    MarkRead {
        chat_id: String,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthResponse {
        success: bool,
        message: String,
    },
    /// A persisted message, delivered to every connection joined to the chat.
    NewMessage {
        message: StoredMessage,
    },
    /// Lightweight notification delivered to every live connection of each
    /// non-sender participant, joined to the chat or not.
    MessageNotification {
        chat_id: String,
        message: StoredMessage,
    },
    UserTyping {
        chat_id: String,
        user_id: String,
    },
    UserStoppedTyping {
        chat_id: String,
        user_id: String,
    },
    MessagesRead {
        chat_id: String,
        user_id: String,
    },
    /// Returned to the initiating connection only; other participants see
    /// nothing until a retry succeeds.
    SendFailed {
        chat_id: String,
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Serialized frame for the write half of a connection.
    pub fn encode(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!("Failed to serialize server event: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeliveryStatus, MessageContent};

    #[test]
    fn test_connect_event_deserialization() {
        let json = r#"{"type":"connect","user_id":"user-1"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        if let ClientEvent::Connect { user_id, token } = event {
            assert_eq!(user_id, "user-1");
            assert!(token.is_none());
        } else {
            panic!("Expected Connect event");
        }

        let json = r#"{"type":"connect","user_id":"user-1","token":"secret"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        if let ClientEvent::Connect { token, .. } = event {
            assert_eq!(token.as_deref(), Some("secret"));
        } else {
            panic!("Expected Connect event");
        }
    }

    #[test]
    fn test_send_message_event_carries_typed_content() {
        let json = r#"{"type":"send_message","chat_id":"c1","content":{"kind":"text","body":"hello"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        if let ClientEvent::SendMessage { chat_id, content } = event {
            assert_eq!(chat_id, "c1");
            assert_eq!(
                content,
                MessageContent::Text {
                    body: "hello".to_string()
                }
            );
        } else {
            panic!("Expected SendMessage event");
        }
    }

    #[test]
    fn test_join_and_leave_events() {
        let join: ClientEvent = serde_json::from_str(r#"{"type":"join_chat","chat_id":"c1"}"#).unwrap();
        assert!(matches!(join, ClientEvent::JoinChat { chat_id } if chat_id == "c1"));

        let leave: ClientEvent =
            serde_json::from_str(r#"{"type":"leave_chat","chat_id":"c1"}"#).unwrap();
        assert!(matches!(leave, ClientEvent::LeaveChat { chat_id } if chat_id == "c1"));
    }

    #[test]
    fn test_new_message_event_serialization() {
        let event = ServerEvent::NewMessage {
            message: StoredMessage {
                id: "m1".to_string(),
                chat_id: "c1".to_string(),
                sender_id: "alice".to_string(),
                content: MessageContent::Text {
                    body: "hello".to_string(),
                },
                read_by: Vec::new(),
                status: DeliveryStatus::Sent,
                created_at: 1234567890,
            },
        };

        let json = event.encode().unwrap();
        assert!(json.contains("\"type\":\"new_message\""));
        assert!(json.contains("\"status\":\"sent\""));
        assert!(json.contains("\"body\":\"hello\""));
    }

    #[test]
    fn test_send_failed_event_serialization() {
        let event = ServerEvent::SendFailed {
            chat_id: "c1".to_string(),
            reason: "not_participant".to_string(),
        };

        let json = event.encode().unwrap();
        assert!(json.contains("\"type\":\"send_failed\""));
        assert!(json.contains("\"reason\":\"not_participant\""));
    }

    #[test]
    fn test_typing_events_serialization() {
        let event = ServerEvent::UserTyping {
            chat_id: "c1".to_string(),
            user_id: "alice".to_string(),
        };
        let json = event.encode().unwrap();
        assert!(json.contains("\"type\":\"user_typing\""));

        let event = ServerEvent::UserStoppedTyping {
            chat_id: "c1".to_string(),
            user_id: "alice".to_string(),
        };
        let json = event.encode().unwrap();
        assert!(json.contains("\"type\":\"user_stopped_typing\""));
    }

    #[test]
    fn test_messages_read_event_serialization() {
        let event = ServerEvent::MessagesRead {
            chat_id: "c1".to_string(),
            user_id: "bob".to_string(),
        };
        let json = event.encode().unwrap();
        assert!(json.contains("\"type\":\"messages_read\""));
        assert!(json.contains("\"user_id\":\"bob\""));
    }
}
