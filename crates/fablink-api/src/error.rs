use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use fablink_types::api::Envelope;
use fablink_types::error::ChatError;

/// Maps the shared error taxonomy onto HTTP statuses and the response
/// envelope. Storage details never reach the client.
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(ChatError::Storage(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ChatError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ChatError::Forbidden => (StatusCode::FORBIDDEN, self.0.to_string()),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            ChatError::Storage(e) => {
                error!("Storage failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(Envelope::<()>::fail(message))).into_response()
    }
}
