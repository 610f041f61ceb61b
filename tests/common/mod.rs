use std::net::SocketAddr;
use std::sync::Arc;

use linkdesk::chat::model::Role;
use linkdesk::{AppState, app, db, relay::RoomBroker};
use sqlx::sqlite::SqlitePoolOptions;

pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub ws_url: String,
}

/// Boot the full router on an ephemeral port over an in-memory database,
/// seeded with two users and two admins.
pub async fn spawn_app() -> TestApp {
    // A single connection keeps every request on the same in-memory database.
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init(&db_pool).await.unwrap();
    db::create_user(&db_pool, "u1", "Una User", Role::User).await.unwrap();
    db::create_user(&db_pool, "u2", "Uri User", Role::User).await.unwrap();
    db::create_user(&db_pool, "a1", "Ada Admin", Role::Admin).await.unwrap();
    db::create_user(&db_pool, "a2", "Abe Admin", Role::Admin).await.unwrap();

    let state = AppState {
        db_pool,
        broker: Arc::new(RoomBroker::new()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    TestApp {
        addr,
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/api/socketio"),
    }
}
