use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{Conversation, MessageView};
use crate::models::{AttachmentPayload, Role};

/// Room a connection joins for targeted delivery. Conversation events are
/// published to exactly the two `user:<id>` rooms of the participants.
pub fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

pub fn role_room(role: Role) -> String {
    format!("role:{}", role.as_str())
}

/// Commands sent FROM client TO server over the live transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    #[serde(rename = "typing:start")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing:stop")]
    TypingStop { conversation_id: Uuid },

    #[serde(rename = "message:send")]
    MessageSend {
        conversation_id: Uuid,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        attachments: Vec<AttachmentPayload>,
        #[serde(default)]
        client_temp_id: Option<String>,
        #[serde(default)]
        requirement_id: Option<Uuid>,
        #[serde(default)]
        ai_design_id: Option<Uuid>,
    },

    /// Mark everything before a cutoff as read. The cutoff is the creation
    /// time of `up_to_message_id` when given and resolvable, else "now".
    #[serde(rename = "message:read")]
    MessageRead {
        conversation_id: Uuid,
        #[serde(default)]
        up_to_message_id: Option<Uuid>,
    },
}

/// Events sent FROM server TO clients over the live transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum LiveEvent {
    /// Server confirms successful authentication.
    #[serde(rename = "ready")]
    Ready { user_id: Uuid, role: Role },

    /// A message was persisted; carries a refreshed conversation snapshot
    /// so clients can update their list previews without another fetch.
    #[serde(rename = "message:new")]
    MessageNew {
        message: MessageView,
        conversation_summary: Conversation,
    },

    /// Read receipt for everything before `at`.
    #[serde(rename = "message:read")]
    MessageRead {
        conversation_id: Uuid,
        reader_user_id: Uuid,
        up_to_message_id: Option<Uuid>,
        at: DateTime<Utc>,
    },

    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// A user came online or went fully offline (last live connection
    /// closed).
    #[serde(rename = "presence")]
    Presence { user_id: Uuid, online: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = LiveEvent::Typing {
            conversation_id: Uuid::nil(),
            user_id: Uuid::nil(),
            is_typing: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["data"]["isTyping"], true);
        assert!(value["data"]["conversationId"].is_string());
    }

    #[test]
    fn test_command_parses_camel_case_payload() {
        let raw = r#"{
            "type": "message:send",
            "data": {
                "conversationId": "00000000-0000-0000-0000-000000000001",
                "body": "hello",
                "clientTempId": "tmp-1"
            }
        }"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::MessageSend {
                body,
                client_temp_id,
                attachments,
                ..
            } => {
                assert_eq!(body.as_deref(), Some("hello"));
                assert_eq!(client_temp_id.as_deref(), Some("tmp-1"));
                assert!(attachments.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_room_names() {
        let id: Uuid = "00000000-0000-0000-0000-000000000002".parse().unwrap();
        assert_eq!(user_room(id), "user:00000000-0000-0000-0000-000000000002");
        assert_eq!(role_room(Role::Buyer), "role:buyer");
        assert_eq!(role_room(Role::Manufacturer), "role:manufacturer");
    }
}
