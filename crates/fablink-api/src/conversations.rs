use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use fablink_db::Database;
use fablink_db::models::ConversationRow;
use fablink_gateway::chat;
use fablink_types::api::{
    ArchiveConversationRequest, Claims, ConversationEntry, CreateConversationRequest, Envelope,
};
use fablink_types::error::ChatError;
use fablink_types::models::Role;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    /// Filters on the counterpart's display name.
    pub search: Option<String>,
}

fn default_limit() -> u32 {
    20
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.chat.db.clone();
    let caller_id = claims.sub;
    let role = claims.role;
    let limit = query.limit.min(100);
    let offset = query.offset;
    let search = query.search;

    let entries = tokio::task::spawn_blocking(move || {
        let rows = db.list_conversations(
            &caller_id.to_string(),
            role,
            limit,
            offset,
            search.as_deref(),
        )?;
        let entries: Vec<ConversationEntry> = rows
            .into_iter()
            .map(|row| enrich_entry(&db, row, caller_id))
            .collect();
        Ok::<_, anyhow::Error>(entries)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::Storage(anyhow::anyhow!("store task failed"))
    })??;

    Ok(Json(Envelope::ok(entries)))
}

/// Enrichment is best-effort per entry: a failed counterpart lookup or
/// preview re-query degrades that entry to its stored denormalized fields
/// instead of aborting the whole list.
fn enrich_entry(db: &Database, row: ConversationRow, caller_id: Uuid) -> ConversationEntry {
    let mut conversation = row.into_view();
    let counterpart_id = conversation.counterpart_of(caller_id);

    let counterpart_name = match db.display_name(&counterpart_id.to_string()) {
        Ok(name) => name,
        Err(e) => {
            warn!("Display name lookup failed for {}: {}", counterpart_id, e);
            None
        }
    };

    // Authoritative preview pulled live — self-heals past refresh failures
    // of the denormalized copy.
    match db.latest_message_brief(&conversation.id.to_string()) {
        Ok(Some((text, at))) => {
            conversation.last_message_text = Some(text);
            if let Ok(at) = at.parse() {
                conversation.last_message_at = Some(at);
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Preview lookup failed for {}: {}", conversation.id, e),
    }

    let unread_count = db
        .unread_count(&conversation.id.to_string(), &caller_id.to_string())
        .unwrap_or_else(|e| {
            warn!("Unread count failed for {}: {}", conversation.id, e);
            0
        });

    ConversationEntry {
        conversation,
        counterpart_id,
        counterpart_name,
        unread_count,
    }
}

/// The caller must be one of the two named parties, acting as their role.
fn may_open(claims: &Claims, buyer_id: Uuid, manufacturer_id: Uuid) -> bool {
    match claims.role {
        Role::Buyer => buyer_id == claims.sub,
        Role::Manufacturer => manufacturer_id == claims.sub,
    }
}

/// Idempotent first-contact: returns the existing conversation when the
/// pair already talked, creates it otherwise.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !may_open(&claims, req.buyer_id, req.manufacturer_id) {
        return Err(ChatError::Forbidden.into());
    }

    let db = state.chat.db.clone();
    let candidate_id = Uuid::new_v4().to_string();

    let row = tokio::task::spawn_blocking(move || {
        db.get_or_create_conversation(
            &candidate_id,
            &req.buyer_id.to_string(),
            &req.manufacturer_id.to_string(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::Storage(anyhow::anyhow!("store task failed"))
    })??;

    Ok(Json(Envelope::ok(row.into_view())))
}

pub async fn archive_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ArchiveConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    chat::authorize_participant(&state.chat, conversation_id, claims.sub, claims.role).await?;

    let db = state.chat.db.clone();
    let id = conversation_id.to_string();
    let archived = req.archived;

    let found = tokio::task::spawn_blocking(move || db.set_archived(&id, archived))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ChatError::Storage(anyhow::anyhow!("store task failed"))
        })??;

    if !found {
        return Err(ChatError::NotFound("conversation").into());
    }

    Ok(Json(Envelope::ok(serde_json::json!({ "archived": archived }))))
}
