pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;

use std::sync::Arc;

use fablink_gateway::chat::ChatContext;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatContext,
}
