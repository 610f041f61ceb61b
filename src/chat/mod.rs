pub mod model;

mod conversations;
mod messages;
mod read;

use axum::{Router, routing::{get, put}};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(conversations::list).post(conversations::create))
        .route("/messages", get(messages::list).post(messages::send))
        .route("/read", put(read::mark_read))
}
