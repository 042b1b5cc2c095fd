//! Message-body sanitizing applied on both send paths before validation.

/// Maximum stored body length in characters.
pub const BODY_MAX_LEN: usize = 4000;

/// Strip HTML tags, trim, and cap the length. Single pass; text inside an
/// unterminated tag is dropped.
pub fn sanitize_body(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;

    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    let trimmed = out.trim();
    if trimmed.chars().count() > BODY_MAX_LEN {
        trimmed.chars().take(BODY_MAX_LEN).collect()
    } else {
        trimmed.to_string()
    }
}
