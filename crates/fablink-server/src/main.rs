use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use fablink_api::middleware::require_auth;
use fablink_api::{AppState, AppStateInner, conversations, messages};
use fablink_gateway::chat::ChatContext;
use fablink_gateway::connection;
use fablink_gateway::dispatcher::Dispatcher;
use fablink_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    chat: ChatContext,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fablink=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("FABLINK_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("FABLINK_DB_PATH").unwrap_or_else(|_| "fablink.db".into());
    let host = std::env::var("FABLINK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("FABLINK_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(fablink_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: one dispatcher for the whole process, injected into
    // both surfaces.
    let dispatcher = Dispatcher::new();
    let chat = ChatContext { db, dispatcher };

    let app_state: AppState = Arc::new(AppStateInner { chat: chat.clone() });

    let state = ServerState { chat, jwt_secret };

    // Routes
    let public_routes = Router::new().route("/healthz", get(healthz));

    let protected_routes = Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations", post(conversations::create_conversation))
        .route(
            "/conversations/{conversation_id}/archive",
            post(conversations::archive_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            post(messages::send_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/requirement/{requirement_id}",
            get(messages::get_requirement_thread),
        )
        .route(
            "/conversations/{conversation_id}/messages/ai-design/{ai_design_id}",
            get(messages::get_design_thread),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(messages::mark_read),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("fablink server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// The live transport authenticates at upgrade time: bearer credential
/// from the `token` query parameter or the Authorization header. The
/// socket is only accepted once the claims check out.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token = query
        .token
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection_authenticated(socket, state.chat, token_data.claims)
    }))
}
