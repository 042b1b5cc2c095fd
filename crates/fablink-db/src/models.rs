//! Database row types — these map directly to SQLite rows. Distinct from
//! the fablink-types wire models to keep the DB layer independent.
//! Conversion to wire views is lenient: a corrupt field is logged and
//! defaulted instead of failing a whole page.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use fablink_types::api::{AttachmentView, Conversation, MessageView};
use fablink_types::models::{FileType, Role};

pub struct ConversationRow {
    pub id: String,
    pub buyer_id: String,
    pub manufacturer_id: String,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<String>,
    pub archived: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_role: String,
    pub sender_id: String,
    pub body: String,
    pub summary: String,
    pub requirement_id: Option<String>,
    pub ai_design_id: Option<String>,
    pub client_temp_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

pub struct AttachmentRow {
    pub id: String,
    pub message_id: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub byte_size: Option<i64>,
    pub file_type: String,
    pub original_name: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub duration_secs: Option<f64>,
    pub thumbnail_url: Option<String>,
}

impl ConversationRow {
    pub fn into_view(self) -> Conversation {
        Conversation {
            id: parse_uuid("conversation id", &self.id),
            buyer_id: parse_uuid("buyer_id", &self.buyer_id),
            manufacturer_id: parse_uuid("manufacturer_id", &self.manufacturer_id),
            last_message_text: self.last_message_text,
            last_message_at: self.last_message_at.as_deref().map(|ts| parse_ts("last_message_at", ts)),
            archived: self.archived,
            created_at: parse_ts("created_at", &self.created_at),
        }
    }
}

impl MessageRow {
    pub fn into_view(self, attachments: Vec<AttachmentRow>) -> MessageView {
        MessageView {
            id: parse_uuid("message id", &self.id),
            conversation_id: parse_uuid("conversation_id", &self.conversation_id),
            sender_role: Role::parse(&self.sender_role).unwrap_or_else(|| {
                warn!("Corrupt sender_role '{}' on message '{}'", self.sender_role, self.id);
                Role::Buyer
            }),
            sender_id: parse_uuid("sender_id", &self.sender_id),
            body: self.body,
            requirement_id: self.requirement_id.and_then(|s| s.parse().ok()),
            ai_design_id: self.ai_design_id.and_then(|s| s.parse().ok()),
            client_temp_id: self.client_temp_id,
            read: self.read,
            created_at: parse_ts("created_at", &self.created_at),
            attachments: attachments.into_iter().map(AttachmentRow::into_view).collect(),
        }
    }
}

impl AttachmentRow {
    pub fn into_view(self) -> AttachmentView {
        AttachmentView {
            id: parse_uuid("attachment id", &self.id),
            message_id: parse_uuid("message_id", &self.message_id),
            url: self.url,
            mime_type: self.mime_type,
            byte_size: self.byte_size,
            file_type: FileType::parse(&self.file_type).unwrap_or_else(|| {
                warn!("Corrupt file_type '{}' on attachment '{}'", self.file_type, self.id);
                FileType::Other
            }),
            original_name: self.original_name,
            width: self.width,
            height: self.height,
            duration_secs: self.duration_secs,
            thumbnail_url: self.thumbnail_url,
        }
    }
}

fn parse_uuid(field: &str, value: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, value, e);
        Uuid::default()
    })
}

/// Timestamps are written as fixed-width RFC3339, but tolerate SQLite's
/// bare "YYYY-MM-DD HH:MM:SS" default format too.
pub(crate) fn parse_ts(field: &str, value: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", field, value, e);
            DateTime::default()
        })
}
