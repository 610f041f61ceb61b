pub mod appresult;
pub mod chat;
pub mod client;
pub mod db;
pub mod relay;
pub mod store;
pub mod users;

use std::sync::Arc;

use axum::{Router, extract::FromRef};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};

use relay::RoomBroker;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub broker: Arc<RoomBroker>,
}

/// The whole HTTP surface: the chat gateway, the users boundary, and the
/// realtime relay endpoint.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/chat", chat::router())
        .nest("/api/users", users::router())
        .merge(relay::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
