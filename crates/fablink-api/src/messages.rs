use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use fablink_gateway::chat::{self, SendMessageInput};
use fablink_types::api::{
    Claims, Envelope, MarkReadRequest, MarkReadResponse, MessageView, SendMessageRequest,
};
use fablink_types::error::ChatError;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` of the oldest
    /// message from the previous page to fetch older messages.
    pub before: Option<DateTime<Utc>>,
    pub requirement_id: Option<Uuid>,
    pub ai_design_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

/// One page of history, oldest first, attachments joined. Optional thread
/// filters narrow the page to a negotiation sub-thread.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let page = fetch_page(&state, conversation_id, &claims, query).await?;
    Ok(Json(Envelope::ok(page)))
}

/// Thread-scoped variant: only messages tagged with the requirement.
pub async fn get_requirement_thread(
    State(state): State<AppState>,
    Path((conversation_id, requirement_id)): Path<(Uuid, Uuid)>,
    Query(mut query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    query.requirement_id = Some(requirement_id);
    query.ai_design_id = None;
    let page = fetch_page(&state, conversation_id, &claims, query).await?;
    Ok(Json(Envelope::ok(page)))
}

/// Thread-scoped variant: only messages tagged with the AI design.
pub async fn get_design_thread(
    State(state): State<AppState>,
    Path((conversation_id, ai_design_id)): Path<(Uuid, Uuid)>,
    Query(mut query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    query.ai_design_id = Some(ai_design_id);
    query.requirement_id = None;
    let page = fetch_page(&state, conversation_id, &claims, query).await?;
    Ok(Json(Envelope::ok(page)))
}

async fn fetch_page(
    state: &AppState,
    conversation_id: Uuid,
    claims: &Claims,
    query: MessageQuery,
) -> Result<Vec<MessageView>, ApiError> {
    chat::authorize_participant(&state.chat, conversation_id, claims.sub, claims.role).await?;

    let db = state.chat.db.clone();
    let id = conversation_id.to_string();
    let limit = query.limit.min(200);
    let before = query.before;
    let requirement_id = query.requirement_id.map(|u| u.to_string());
    let ai_design_id = query.ai_design_id.map(|u| u.to_string());

    let page = tokio::task::spawn_blocking(move || {
        db.list_messages_with_attachments(
            &id,
            before,
            limit,
            requirement_id.as_deref(),
            ai_design_id.as_deref(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::Storage(anyhow::anyhow!("store task failed"))
    })??;

    Ok(page
        .into_iter()
        .map(|(row, attachments)| row.into_view(attachments))
        .collect())
}

/// Persist a message and fan it out to both participants' live sessions.
/// 400 when both body and attachments are absent.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (message, _) = chat::send_message(
        &state.chat,
        claims.sub,
        claims.role,
        SendMessageInput {
            conversation_id,
            body: req.body,
            attachments: req.attachments,
            client_temp_id: req.client_temp_id,
            requirement_id: req.requirement_id,
            ai_design_id: req.ai_design_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(Envelope::ok(message))))
}

/// Flip read flags up to the given cutoff (default: now) and broadcast the
/// receipt.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let up_to = req.up_to.unwrap_or_else(Utc::now);

    let updated = chat::mark_read(
        &state.chat,
        claims.sub,
        claims.role,
        conversation_id,
        up_to,
        None,
    )
    .await?;

    Ok(Json(Envelope::ok(MarkReadResponse { updated })))
}
