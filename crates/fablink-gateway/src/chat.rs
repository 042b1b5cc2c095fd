//! Conversation orchestration shared by the HTTP handlers and the live
//! transport. Both paths funnel through the same persistence calls here;
//! the live path's broadcasts happen here too so HTTP sends reach
//! connected clients exactly like socket sends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use fablink_db::Database;
use fablink_types::api::{Conversation, MessageView};
use fablink_types::error::ChatError;
use fablink_types::events::{LiveEvent, user_room};
use fablink_types::models::{AttachmentPayload, NewAttachment, Role, ThreadContext};
use fablink_types::sanitize::sanitize_body;
use fablink_types::summary::summarize_preview;

use crate::dispatcher::Dispatcher;

/// Shared handle handed to every surface that talks to conversations.
#[derive(Clone)]
pub struct ChatContext {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}

pub struct SendMessageInput {
    pub conversation_id: Uuid,
    pub body: Option<String>,
    pub attachments: Vec<AttachmentPayload>,
    pub client_temp_id: Option<String>,
    pub requirement_id: Option<Uuid>,
    pub ai_design_id: Option<Uuid>,
}

/// Run a blocking store call off the async runtime.
async fn blocking<T, F>(db: Arc<Database>, f: F) -> Result<T, ChatError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ChatError::Storage(anyhow::anyhow!("store task failed"))
        })?
        .map_err(ChatError::Storage)
}

/// Load the conversation and verify the actor is one of its two declared
/// parties. Applied per operation, not only at connect time.
pub async fn authorize_participant(
    ctx: &ChatContext,
    conversation_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> Result<Conversation, ChatError> {
    let id = conversation_id.to_string();
    let row = blocking(ctx.db.clone(), move |db| db.get_conversation(&id)).await?;
    let conversation = row.ok_or(ChatError::NotFound("conversation"))?.into_view();

    if !conversation.is_participant(user_id, role) {
        return Err(ChatError::Forbidden);
    }
    Ok(conversation)
}

async fn publish_to_participants(ctx: &ChatContext, conversation: &Conversation, event: LiveEvent) {
    ctx.dispatcher
        .publish(&user_room(conversation.buyer_id), event.clone())
        .await;
    ctx.dispatcher
        .publish(&user_room(conversation.manufacturer_id), event)
        .await;
}

/// Sanitize, validate, persist, and fan out one message. Returns the
/// persisted message (with its attachment batch) and the refreshed
/// conversation snapshot carried on the broadcast.
pub async fn send_message(
    ctx: &ChatContext,
    actor_id: Uuid,
    actor_role: Role,
    input: SendMessageInput,
) -> Result<(MessageView, Conversation), ChatError> {
    let conversation =
        authorize_participant(ctx, input.conversation_id, actor_id, actor_role).await?;

    let context = ThreadContext::from_ids(input.requirement_id, input.ai_design_id)?;
    let body = sanitize_body(input.body.as_deref().unwrap_or(""));
    let attachments = input
        .attachments
        .into_iter()
        .map(AttachmentPayload::normalize)
        .collect::<Result<Vec<NewAttachment>, _>>()?;

    if body.is_empty() && attachments.is_empty() {
        return Err(ChatError::Validation(
            "message needs a body or at least one attachment".into(),
        ));
    }

    let summary = summarize_preview(&body, &attachments);

    let message_id = Uuid::new_v4().to_string();
    let conversation_id = conversation.id.to_string();
    let sender_id = actor_id.to_string();
    let requirement_id = context.and_then(|c| c.requirement_id()).map(|id| id.to_string());
    let ai_design_id = context.and_then(|c| c.design_id()).map(|id| id.to_string());
    let client_temp_id = input.client_temp_id;

    let (row, attachment_rows) = {
        let conversation_id = conversation_id.clone();
        blocking(ctx.db.clone(), move |db| {
            let row = db.insert_message(
                &message_id,
                &conversation_id,
                actor_role,
                &sender_id,
                &body,
                &summary,
                requirement_id.as_deref(),
                ai_design_id.as_deref(),
                client_temp_id.as_deref(),
            )?;
            let attachment_rows = db.insert_attachments(&row.id, &attachments)?;
            Ok((row, attachment_rows))
        })
        .await?
    };

    // Fresh snapshot for the broadcast; fall back to the pre-send view if
    // the re-read fails so the send itself still succeeds.
    let snapshot = blocking(ctx.db.clone(), move |db| db.get_conversation(&conversation_id)).await;
    let conversation = match snapshot {
        Ok(Some(row)) => row.into_view(),
        Ok(None) => conversation,
        Err(e) => {
            warn!("Conversation re-read failed after send: {}", e);
            conversation
        }
    };

    let message = row.into_view(attachment_rows);

    publish_to_participants(
        ctx,
        &conversation,
        LiveEvent::MessageNew {
            message: message.clone(),
            conversation_summary: conversation.clone(),
        },
    )
    .await;

    Ok((message, conversation))
}

/// Typing state is transient: verified, re-broadcast to both participant
/// rooms (the sender's own devices included), never persisted.
pub async fn set_typing(
    ctx: &ChatContext,
    actor_id: Uuid,
    actor_role: Role,
    conversation_id: Uuid,
    is_typing: bool,
) -> Result<(), ChatError> {
    let conversation = authorize_participant(ctx, conversation_id, actor_id, actor_role).await?;

    publish_to_participants(
        ctx,
        &conversation,
        LiveEvent::Typing {
            conversation_id,
            user_id: actor_id,
            is_typing,
        },
    )
    .await;
    Ok(())
}

/// Cutoff for a read receipt: the referenced message's creation time when
/// an id is given and resolvable, otherwise "now".
pub async fn resolve_cutoff(ctx: &ChatContext, up_to_message_id: Option<Uuid>) -> DateTime<Utc> {
    if let Some(message_id) = up_to_message_id {
        let id = message_id.to_string();
        match blocking(ctx.db.clone(), move |db| db.get_message(&id)).await {
            Ok(Some(row)) => {
                if let Ok(at) = row.created_at.parse::<DateTime<Utc>>() {
                    return at;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Cutoff lookup failed for message {}: {}", message_id, e),
        }
    }
    Utc::now()
}

/// Flip read flags up to the cutoff and fan out the receipt.
pub async fn mark_read(
    ctx: &ChatContext,
    actor_id: Uuid,
    actor_role: Role,
    conversation_id: Uuid,
    up_to: DateTime<Utc>,
    up_to_message_id: Option<Uuid>,
) -> Result<usize, ChatError> {
    let conversation = authorize_participant(ctx, conversation_id, actor_id, actor_role).await?;

    let id = conversation.id.to_string();
    let reader = actor_id.to_string();
    let updated = blocking(ctx.db.clone(), move |db| db.mark_read(&id, &reader, up_to)).await?;

    publish_to_participants(
        ctx,
        &conversation,
        LiveEvent::MessageRead {
            conversation_id,
            reader_user_id: actor_id,
            up_to_message_id,
            at: up_to,
        },
    )
    .await;

    Ok(updated)
}
