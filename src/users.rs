//! The sliver of user management the chat surface needs: enough to resolve a
//! support admin to talk to. Accounts, auth and profiles live elsewhere.

use axum::{Json, Router, debug_handler, extract::State, routing::get};
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::{AppResult, AppState, chat::model::UserRef};

pub fn router() -> Router<AppState> {
    Router::new().route("/admins", get(admins))
}

/// GET /api/users/admins: the admins a user may open a conversation with.
#[debug_handler]
pub(crate) async fn admins(State(db_pool): State<SqlitePool>) -> AppResult<Json<Value>> {
    let rows: Vec<(String, String, String)> =
        sqlx::query_as("SELECT id,name,role FROM users WHERE role='admin' ORDER BY id")
            .fetch_all(&db_pool)
            .await?;

    let admins = rows
        .into_iter()
        .map(|(id, name, role)| {
            Ok(UserRef { id, name, role: role.parse()? })
        })
        .collect::<AppResult<Vec<UserRef>>>()?;

    Ok(Json(json!({ "admins": admins })))
}
