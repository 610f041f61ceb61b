use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::model;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReadBody {
    conversation_id: Option<Uuid>,
    user_id: Option<String>,
}

/// PUT /api/chat/read: batch-mark everything the peer sent as read and zero
/// the conversation's unread counter. Idempotent; a second call updates
/// nothing and reports zero.
#[debug_handler]
pub(crate) async fn mark_read(
    State(db_pool): State<SqlitePool>,
    Json(ReadBody { conversation_id, user_id }): Json<ReadBody>,
) -> AppResult<Json<Value>> {
    let conversation_id =
        conversation_id.ok_or(AppError::Validation("conversationId is required"))?;
    let user_id = user_id.ok_or(AppError::Validation("userId is required"))?;

    let conversation = model::conversation_row(&db_pool, conversation_id)
        .await?
        .ok_or(AppError::NotFound("conversation"))?;

    if !conversation.is_participant(&user_id) {
        return Err(AppError::Unauthorized(
            "reader is not a participant in this conversation",
        ));
    }

    let updated = sqlx::query(
        "UPDATE messages SET read=1 WHERE conversation_id=? AND sender_id != ? AND read=0",
    )
    .bind(conversation_id.to_string())
    .bind(&user_id)
    .execute(&db_pool)
    .await?
    .rows_affected();

    sqlx::query("UPDATE conversations SET unread_count=0 WHERE id=?")
        .bind(conversation_id.to_string())
        .execute(&db_pool)
        .await?;

    tracing::debug!(conversation = %conversation_id, reader = %user_id, updated, "marked read");
    Ok(Json(json!({ "success": true, "messagesUpdated": updated })))
}
