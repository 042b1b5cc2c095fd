use thiserror::Error;

/// Error taxonomy shared by the HTTP surface and the live transport.
///
/// HTTP maps these to statuses; the live transport logs and drops every
/// variant without surfacing anything to the socket.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed or missing required fields.
    #[error("{0}")]
    Validation(String),

    /// The acting identity is not a participant of the conversation.
    #[error("not a conversation participant")]
    Forbidden,

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Underlying persistence failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
