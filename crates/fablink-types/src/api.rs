use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AttachmentPayload, FileType, Role};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket handshake.
/// Canonical definition lives here to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub name: String,
    pub exp: usize,
}

// -- Response envelope --

/// Every HTTP response is wrapped in this envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: "ok".into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub buyer_id: Uuid,
    pub manufacturer_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArchiveConversationRequest {
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub manufacturer_id: Uuid,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Returns the party opposite `user_id`, assuming `user_id` is a
    /// participant.
    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if self.buyer_id == user_id {
            self.manufacturer_id
        } else {
            self.buyer_id
        }
    }

    pub fn is_participant(&self, user_id: Uuid, role: Role) -> bool {
        match role {
            Role::Buyer => self.buyer_id == user_id,
            Role::Manufacturer => self.manufacturer_id == user_id,
        }
    }
}

/// One conversation-list entry: the stored conversation enriched with the
/// counterpart, an authoritative last-message preview, and the caller's
/// unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart_id: Uuid,
    pub counterpart_name: Option<String>,
    pub unread_count: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub client_temp_id: Option<String>,
    #[serde(default)]
    pub requirement_id: Option<Uuid>,
    #[serde(default)]
    pub ai_design_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[serde(default)]
    pub up_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_role: Role,
    pub sender_id: Uuid,
    pub body: String,
    pub requirement_id: Option<Uuid>,
    pub ai_design_id: Option<Uuid>,
    pub client_temp_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub id: Uuid,
    pub message_id: Uuid,
    pub url: String,
    pub mime_type: Option<String>,
    pub byte_size: Option<i64>,
    pub file_type: FileType,
    pub original_name: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub duration_secs: Option<f64>,
    pub thumbnail_url: Option<String>,
}
