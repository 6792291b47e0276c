//! Push-channel wire protocol.
//!
//! Messages are JSON with an internally-tagged `"type"` discriminator so
//! the server and other clients can route by type string. Payload fields
//! use the collaborator's camelCase names (`conversationId`).

use serde::{Deserialize, Serialize};

use lancer_core::conversation::Message;
use lancer_core::notification::Notification;
use lancer_core::types::DbId;
use lancer_core::upload::UploadedFile;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// A logical push channel. Ordering is guaranteed within one channel
/// only; nothing is guaranteed across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// The authenticated user's notification feed.
    Notifications,
    /// One conversation's message stream.
    Conversation(DbId),
}

// ---------------------------------------------------------------------------
// Server -> client events
// ---------------------------------------------------------------------------

/// Events the server pushes to a connected session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A notification was created for the current user.
    #[serde(rename = "new_notification")]
    NewNotification { notification: Notification },

    /// A message arrived in a conversation the session has joined.
    #[serde(rename = "new_message")]
    NewMessage {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
        message: Message,
    },

    /// The other participant is typing. Soft signal; droppable.
    #[serde(rename = "user_typing")]
    UserTyping {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
    },

    /// The other participant stopped typing. Soft signal; droppable.
    #[serde(rename = "user_stop_typing")]
    UserStopTyping {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
    },
}

impl ServerEvent {
    /// The channel this event belongs to, for ordering and gap tracking.
    pub fn channel(&self) -> Channel {
        match self {
            ServerEvent::NewNotification { .. } => Channel::Notifications,
            ServerEvent::NewMessage {
                conversation_id, ..
            }
            | ServerEvent::UserTyping { conversation_id }
            | ServerEvent::UserStopTyping { conversation_id } => {
                Channel::Conversation(*conversation_id)
            }
        }
    }
}

/// Wire envelope around a [`ServerEvent`].
///
/// `seq` is the per-channel sequence number, monotonically increasing
/// where the server provides one. Events without a `seq` are applied
/// without gap tracking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

// ---------------------------------------------------------------------------
// Client -> server events
// ---------------------------------------------------------------------------

/// A message payload as sent over the push channel, before the server
/// has assigned an id. `clientRef` is the client-generated temporary id
/// the ack is matched against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub client_ref: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<UploadedFile>,
}

/// Events a client session emits to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join_conversation")]
    JoinConversation {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
    },

    #[serde(rename = "leave_conversation")]
    LeaveConversation {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
    },

    #[serde(rename = "send_message")]
    SendMessage {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
        message: MessageDraft,
    },

    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
    },

    #[serde(rename = "stop_typing")]
    StopTyping {
        #[serde(rename = "conversationId")]
        conversation_id: DbId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lancer_core::notification::NotificationKind;

    #[test]
    fn test_server_event_type_tags() {
        let event = ServerEvent::UserTyping { conversation_id: 5 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert_eq!(json["conversationId"], 5);
    }

    #[test]
    fn test_push_frame_round_trip_with_seq() {
        let frame = PushFrame {
            seq: Some(42),
            event: ServerEvent::NewNotification {
                notification: Notification {
                    id: 1,
                    user_id: 7,
                    kind: NotificationKind::Job,
                    title: "t".to_string(),
                    message: "m".to_string(),
                    read: false,
                    link: None,
                    metadata: None,
                    created_at: Utc::now(),
                },
            },
        };

        let json = serde_json::to_string(&frame).unwrap();
        let back: PushFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, Some(42));
        assert_eq!(back.event.channel(), Channel::Notifications);
    }

    #[test]
    fn test_frame_without_seq_deserializes() {
        let json = r#"{"type":"user_stop_typing","conversationId":9}"#;
        let frame: PushFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.seq, None);
        assert_eq!(frame.event.channel(), Channel::Conversation(9));
    }

    #[test]
    fn test_client_event_send_message_shape() {
        let event = ClientEvent::SendMessage {
            conversation_id: 3,
            message: MessageDraft {
                client_ref: "tmp-1".to_string(),
                content: "hello".to_string(),
                attachments: Vec::new(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "send_message");
        assert_eq!(json["message"]["clientRef"], "tmp-1");
    }
}
