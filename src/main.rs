use std::sync::Arc;

use linkdesk::{AppState, app, db, relay::RoomBroker};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkdesk=debug,tower_http=info".into()),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:linkdesk.db?mode=rwc".to_owned());
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&database_url)
        .await?;
    db::init(&db_pool).await?;

    let state = AppState {
        db_pool,
        broker: Arc::new(RoomBroker::new()),
    };

    let addr = dotenv::var("LINKDESK_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");
    axum::serve(listener, app(state)).await?;

    Ok(())
}
