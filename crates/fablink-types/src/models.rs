use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;

/// Participant role on a conversation. Every authenticated identity acts as
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Manufacturer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Manufacturer => "manufacturer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "buyer" => Some(Role::Buyer),
            "manufacturer" => Some(Role::Manufacturer),
            _ => None,
        }
    }
}

/// Coarse attachment classification used for previews and client rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl FileType {
    /// Bracketed label used in conversation previews.
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Image => "Image",
            FileType::Video => "Video",
            FileType::Audio => "Audio",
            FileType::Document => "Document",
            FileType::Other => "Attachment",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Document => "document",
            FileType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<FileType> {
        match s {
            "image" => Some(FileType::Image),
            "video" => Some(FileType::Video),
            "audio" => Some(FileType::Audio),
            "document" => Some(FileType::Document),
            "other" => Some(FileType::Other),
            _ => None,
        }
    }

    /// Classify from a MIME type when the client did not send an explicit
    /// file type.
    pub fn from_mime(mime: &str) -> FileType {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            FileType::Image
        } else if mime.starts_with("video/") {
            FileType::Video
        } else if mime.starts_with("audio/") {
            FileType::Audio
        } else if mime.is_empty() {
            FileType::Other
        } else {
            FileType::Document
        }
    }
}

/// Optional negotiation-thread tag on a message: a message belongs to the
/// whole conversation, to a requirement sub-thread, or to an AI-design
/// sub-thread — never to two threads at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadContext {
    Requirement(Uuid),
    Design(Uuid),
}

impl ThreadContext {
    /// Build from the two wire-level optional ids. Naming both is rejected.
    pub fn from_ids(
        requirement_id: Option<Uuid>,
        ai_design_id: Option<Uuid>,
    ) -> Result<Option<ThreadContext>, ChatError> {
        match (requirement_id, ai_design_id) {
            (None, None) => Ok(None),
            (Some(id), None) => Ok(Some(ThreadContext::Requirement(id))),
            (None, Some(id)) => Ok(Some(ThreadContext::Design(id))),
            (Some(_), Some(_)) => Err(ChatError::Validation(
                "a message may reference a requirement or an AI design, not both".into(),
            )),
        }
    }

    pub fn requirement_id(&self) -> Option<Uuid> {
        match self {
            ThreadContext::Requirement(id) => Some(*id),
            ThreadContext::Design(_) => None,
        }
    }

    pub fn design_id(&self) -> Option<Uuid> {
        match self {
            ThreadContext::Requirement(_) => None,
            ThreadContext::Design(id) => Some(*id),
        }
    }
}

/// Incoming attachment payload. Older clients send snake_case keys, newer
/// ones camelCase; both are accepted here and nowhere else — `normalize`
/// is the single point where aliasing ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPayload {
    #[serde(alias = "fileUrl", alias = "file_url")]
    pub url: String,
    #[serde(default, alias = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default, alias = "byteSize", alias = "size")]
    pub byte_size: Option<i64>,
    #[serde(default, alias = "fileType")]
    pub file_type: Option<FileType>,
    #[serde(default, alias = "originalName", alias = "fileName", alias = "file_name")]
    pub original_name: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default, alias = "durationSecs")]
    pub duration_secs: Option<f64>,
    #[serde(default, alias = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
}

impl AttachmentPayload {
    pub fn normalize(self) -> Result<NewAttachment, ChatError> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(ChatError::Validation("attachment url is required".into()));
        }

        let file_type = self.file_type.unwrap_or_else(|| {
            self.mime_type
                .as_deref()
                .map(FileType::from_mime)
                .unwrap_or(FileType::Other)
        });

        Ok(NewAttachment {
            url,
            mime_type: self.mime_type,
            byte_size: self.byte_size,
            file_type,
            original_name: self
                .original_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            width: self.width,
            height: self.height,
            duration_secs: self.duration_secs,
            thumbnail_url: self.thumbnail_url,
        })
    }
}

/// Normalized attachment, ready to persist alongside its message.
#[derive(Debug, Clone)]
pub struct NewAttachment {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_context_from_ids() {
        assert_eq!(ThreadContext::from_ids(None, None).unwrap(), None);

        let req = Uuid::new_v4();
        assert_eq!(
            ThreadContext::from_ids(Some(req), None).unwrap(),
            Some(ThreadContext::Requirement(req))
        );

        let design = Uuid::new_v4();
        assert_eq!(
            ThreadContext::from_ids(None, Some(design)).unwrap(),
            Some(ThreadContext::Design(design))
        );

        assert!(ThreadContext::from_ids(Some(req), Some(design)).is_err());
    }

    #[test]
    fn test_file_type_from_mime() {
        assert_eq!(FileType::from_mime("image/png"), FileType::Image);
        assert_eq!(FileType::from_mime("VIDEO/mp4"), FileType::Video);
        assert_eq!(FileType::from_mime("audio/ogg"), FileType::Audio);
        assert_eq!(FileType::from_mime("application/pdf"), FileType::Document);
        assert_eq!(FileType::from_mime(""), FileType::Other);
    }

    #[test]
    fn test_attachment_payload_accepts_both_key_styles() {
        let camel: AttachmentPayload = serde_json::from_str(
            r#"{"fileUrl":"https://cdn.example/a.png","mimeType":"image/png","originalName":"a.png"}"#,
        )
        .unwrap();
        let snake: AttachmentPayload = serde_json::from_str(
            r#"{"url":"https://cdn.example/a.png","mime_type":"image/png","original_name":"a.png"}"#,
        )
        .unwrap();

        let camel = camel.normalize().unwrap();
        let snake = snake.normalize().unwrap();
        assert_eq!(camel.url, snake.url);
        assert_eq!(camel.file_type, FileType::Image);
        assert_eq!(snake.file_type, FileType::Image);
        assert_eq!(camel.original_name.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_normalize_rejects_blank_url() {
        let payload: AttachmentPayload =
            serde_json::from_str(r#"{"url":"   "}"#).unwrap();
        assert!(payload.normalize().is_err());
    }
}
