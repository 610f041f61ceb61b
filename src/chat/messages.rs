use axum::{Json, debug_handler, extract::{Query, State}};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::model::{self, MESSAGE_COLUMNS, Message, Role};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListQuery {
    conversation_id: Option<Uuid>,
}

/// GET /api/chat/messages: a conversation's messages, oldest first.
#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    Query(ListQuery { conversation_id }): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let conversation_id =
        conversation_id.ok_or(AppError::Validation("conversationId is required"))?;

    if model::conversation_row(&db_pool, conversation_id).await?.is_none() {
        return Err(AppError::NotFound("conversation"));
    }

    // uuid v7 ids break timestamp ties in insertion order.
    let rows: Vec<_> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE conversation_id=? ORDER BY timestamp ASC, id ASC"
    ))
    .bind(conversation_id.to_string())
    .fetch_all(&db_pool)
    .await?;

    let messages = rows
        .into_iter()
        .map(model::message_from_tuple)
        .collect::<AppResult<Vec<Message>>>()?;

    Ok(Json(json!({ "messages": messages })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendBody {
    conversation_id: Option<Uuid>,
    sender_id: Option<String>,
    text: Option<String>,
    sender_type: Option<Role>,
}

/// POST /api/chat/messages: durably record a message and touch the owning
/// conversation (last-message pointer, unread counter, update timestamp).
#[debug_handler]
pub(crate) async fn send(
    State(db_pool): State<SqlitePool>,
    Json(SendBody { conversation_id, sender_id, text, sender_type }): Json<SendBody>,
) -> AppResult<Json<Value>> {
    let conversation_id =
        conversation_id.ok_or(AppError::Validation("conversationId is required"))?;
    let sender_id = sender_id.ok_or(AppError::Validation("senderId is required"))?;
    let text = text.ok_or(AppError::Validation("text is required"))?;
    let sender_type = sender_type.ok_or(AppError::Validation("senderType is required"))?;

    if text.is_empty() {
        return Err(AppError::Validation("text must not be empty"));
    }

    let conversation = model::conversation_row(&db_pool, conversation_id)
        .await?
        .ok_or(AppError::NotFound("conversation"))?;

    if !conversation.is_participant(&sender_id) {
        return Err(AppError::Unauthorized(
            "sender is not a participant in this conversation",
        ));
    }

    let message = Message {
        id: Uuid::now_v7(),
        conversation: conversation_id,
        sender: sender_id,
        sender_type,
        text,
        timestamp: model::now_millis(),
        read: false,
    };

    sqlx::query(
        "INSERT INTO messages (id,conversation_id,sender_id,sender_type,text,timestamp,read)
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(message.id.to_string())
    .bind(message.conversation.to_string())
    .bind(&message.sender)
    .bind(message.sender_type.as_str())
    .bind(&message.text)
    .bind(message.timestamp)
    .bind(message.read)
    .execute(&db_pool)
    .await?;

    // Unconditional +1, not per recipient: the counter tracks the thread, and
    // the peer's markRead resets it wholesale.
    sqlx::query(
        "UPDATE conversations SET last_message_id=?, unread_count=unread_count+1, updated_at=?
         WHERE id=?",
    )
    .bind(message.id.to_string())
    .bind(model::now_millis())
    .bind(conversation_id.to_string())
    .execute(&db_pool)
    .await?;

    tracing::debug!(conversation = %conversation_id, message = %message.id, "message stored");
    Ok(Json(json!({ "message": message })))
}
