//! Conversation-list preview derivation. Pure, no I/O.

use crate::models::NewAttachment;

/// Maximum preview length in characters.
pub const SUMMARY_MAX_LEN: usize = 120;

/// Derive the short preview shown in conversation lists.
///
/// A non-empty body wins. Otherwise the first attachment yields a
/// `[Label] name` preview, with a `(+N more)` suffix when the message
/// carries several. No body and no attachments yields an empty string.
pub fn summarize_preview(body: &str, attachments: &[NewAttachment]) -> String {
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return truncate_chars(trimmed, SUMMARY_MAX_LEN);
    }

    let Some(first) = attachments.first() else {
        return String::new();
    };

    let label = first.file_type.label();
    let name = first
        .original_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(label);

    let mut preview = format!("[{label}] {name}");
    if attachments.len() > 1 {
        preview.push_str(&format!(" (+{} more)", attachments.len() - 1));
    }

    truncate_chars(&preview, SUMMARY_MAX_LEN)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
