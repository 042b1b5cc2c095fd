use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use fablink_types::api::Claims;
use fablink_types::events::{ClientCommand, LiveEvent, role_room, user_room};
use fablink_types::models::Role;

use crate::chat::{self, ChatContext, SendMessageInput};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The bearer credential
/// was already validated at the HTTP upgrade layer, so we go straight to
/// Ready + event loop.
pub async fn handle_connection_authenticated(socket: WebSocket, ctx: ChatContext, claims: Claims) {
    let user_id = claims.sub;
    let role = claims.role;
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to live transport", claims.name, user_id);

    let ready = LiveEvent::Ready { user_id, role };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    run_connection_loop(sender, receiver, ctx, user_id, role).await;
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    ctx: ChatContext,
    user_id: Uuid,
    role: Role,
) {
    // Every connection lives in its personal room and its role room.
    let conn_id = Uuid::new_v4();
    let rooms = vec![user_room(user_id), role_room(role)];
    let (room_tx, mut room_rx) = tokio::sync::mpsc::unbounded_channel();
    ctx.dispatcher.join(&rooms, conn_id, room_tx).await;

    // Send existing online users to this client so it sees who's already
    // here, then count ourselves in and announce it. Re-announcing an
    // already-online identity is harmless; offline is only announced when
    // the last connection closes.
    for online_id in ctx.dispatcher.online_users().await {
        let event = LiveEvent::Presence {
            user_id: online_id,
            online: true,
        };
        if sender
            .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
            .await
            .is_err()
        {
            ctx.dispatcher.leave(&rooms, conn_id).await;
            return;
        }
    }

    ctx.dispatcher.connect(user_id).await;
    ctx.dispatcher.broadcast(LiveEvent::Presence {
        user_id,
        online: true,
    });

    // Subscribe to global broadcasts and relay to this client
    let mut broadcast_rx = ctx.dispatcher.subscribe();
    let ctx_recv = ctx.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts + room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if sender
                        .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                result = room_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    if sender
                        .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&ctx_recv, user_id, role, cmd).await,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", user_id, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.leave(&rooms, conn_id).await;
    if ctx.dispatcher.disconnect(user_id).await {
        ctx.dispatcher.broadcast(LiveEvent::Presence {
            user_id,
            online: false,
        });
    }
    info!("{} disconnected from live transport", user_id);
}

/// There is no reply contract on this surface: every handler failure —
/// validation, authorization, missing rows, storage — is logged and
/// dropped so a bad event can never take down the connection or leak
/// internals to the socket. Clients reconcile through the HTTP history
/// API and the clientTempId echo.
async fn handle_command(ctx: &ChatContext, user_id: Uuid, role: Role, cmd: ClientCommand) {
    let result = match cmd {
        ClientCommand::TypingStart { conversation_id } => {
            chat::set_typing(ctx, user_id, role, conversation_id, true).await
        }

        ClientCommand::TypingStop { conversation_id } => {
            chat::set_typing(ctx, user_id, role, conversation_id, false).await
        }

        ClientCommand::MessageSend {
            conversation_id,
            body,
            attachments,
            client_temp_id,
            requirement_id,
            ai_design_id,
        } => chat::send_message(
            ctx,
            user_id,
            role,
            SendMessageInput {
                conversation_id,
                body,
                attachments,
                client_temp_id,
                requirement_id,
                ai_design_id,
            },
        )
        .await
        .map(|_| ()),

        ClientCommand::MessageRead {
            conversation_id,
            up_to_message_id,
        } => {
            let at = chat::resolve_cutoff(ctx, up_to_message_id).await;
            chat::mark_read(ctx, user_id, role, conversation_id, at, up_to_message_id)
                .await
                .map(|_| ())
        }
    };

    if let Err(e) = result {
        warn!("{} live event dropped: {}", user_id, e);
    }
}
