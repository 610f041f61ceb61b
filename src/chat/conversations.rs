use axum::{Json, debug_handler, extract::{Query, State}};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::model::{self, CONVERSATION_COLUMNS, Conversation, ConversationRow, Role};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListQuery {
    user_id: Option<String>,
    #[serde(default)]
    is_admin: bool,
}

/// GET /api/chat/conversations: every conversation the caller participates
/// in, newest activity first. Admins get the whole table, unpaginated.
#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    Query(ListQuery { user_id, is_admin }): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let user_id = user_id.ok_or(AppError::Validation("userId is required"))?;

    if model::user_ref(&db_pool, &user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }

    let rows: Vec<_> = if is_admin {
        sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY updated_at DESC"
        ))
        .fetch_all(&db_pool)
        .await?
    } else {
        sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE user_id=? OR admin_id=? ORDER BY updated_at DESC"
        ))
        .bind(&user_id)
        .bind(&user_id)
        .fetch_all(&db_pool)
        .await?
    };

    let mut conversations = Vec::with_capacity(rows.len());
    for row in rows {
        conversations.push(model::hydrate(&db_pool, ConversationRow::from_tuple(row)?).await?);
    }

    Ok(Json(json!({ "conversations": conversations })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateBody {
    user_id: Option<String>,
    admin_id: Option<String>,
}

/// POST /api/chat/conversations: create-or-get the conversation for a
/// (user, admin) pair. The UNIQUE(user_id, admin_id) constraint makes two
/// racing creates converge on a single row.
#[debug_handler]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    Json(CreateBody { user_id, admin_id }): Json<CreateBody>,
) -> AppResult<Json<Value>> {
    let user_id = user_id.ok_or(AppError::Validation("userId is required"))?;

    if model::user_ref(&db_pool, &user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }

    let admin_id = match admin_id {
        Some(admin_id) => match model::user_ref(&db_pool, &admin_id).await? {
            Some(admin) if admin.role == Role::Admin => admin.id,
            _ => return Err(AppError::NotFound("admin")),
        },
        // The web client normally picks an admin from the admins listing;
        // fall back to the lowest-id admin when it doesn't.
        None => sqlx::query_as::<_, (String,)>(
            "SELECT id FROM users WHERE role='admin' ORDER BY id LIMIT 1",
        )
        .fetch_optional(&db_pool)
        .await?
        .ok_or(AppError::NotFound("admin"))?
        .0,
    };

    let conversation = create_or_get(&db_pool, &user_id, &admin_id).await?;
    Ok(Json(json!({ "conversation": conversation })))
}

pub(crate) async fn create_or_get(
    db_pool: &SqlitePool,
    user_id: &str,
    admin_id: &str,
) -> AppResult<Conversation> {
    if let Some(existing) = pair_row(db_pool, user_id, admin_id).await? {
        return model::hydrate(db_pool, existing).await;
    }

    let now = model::now_millis();
    sqlx::query(
        "INSERT INTO conversations (id,user_id,admin_id,unread_count,created_at,updated_at)
         VALUES (?,?,?,0,?,?)
         ON CONFLICT (user_id,admin_id) DO NOTHING",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_id)
    .bind(admin_id)
    .bind(now)
    .bind(now)
    .execute(db_pool)
    .await?;

    // Re-select rather than trusting our insert: a concurrent caller may have
    // won the conflict, and its row is the one that counts.
    let row = pair_row(db_pool, user_id, admin_id)
        .await?
        .ok_or(AppError::NotFound("conversation"))?;

    tracing::info!(user = user_id, admin = admin_id, id = %row.id, "conversation ready");
    model::hydrate(db_pool, row).await
}

async fn pair_row(
    db_pool: &SqlitePool,
    user_id: &str,
    admin_id: &str,
) -> AppResult<Option<ConversationRow>> {
    let row: Option<_> = sqlx::query_as(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id=? AND admin_id=?"
    ))
    .bind(user_id)
    .bind(admin_id)
    .fetch_optional(db_pool)
    .await?;

    row.map(ConversationRow::from_tuple).transpose()
}
