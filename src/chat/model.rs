use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Which side of a conversation an actor sits on. Doubles as the sender kind
/// on messages; the gateway trusts the declared value rather than re-deriving
/// it from the sender id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(anyhow!("unknown role {other:?}")),
        }
    }
}

/// The slice of a user the chat surface exposes. Accounts themselves are an
/// external concern; only id, display name and role cross the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation: Uuid,
    pub sender: String,
    pub sender_type: Role,
    pub text: String,
    /// Unix milliseconds, assigned by the gateway at creation.
    pub timestamp: i64,
    pub read: bool,
}

/// A durable two-party (user, admin) thread. `participants` is always
/// `[user, admin]` and immutable after creation; `last_message` is a
/// denormalized copy kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Vec<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Conversation {
    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|p| p.id.as_str())
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant_ids().any(|id| id == user_id)
    }
}

pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Raw `conversations` row, before participants and the last message are
/// hydrated from their own tables.
pub(crate) struct ConversationRow {
    pub(crate) id: Uuid,
    pub(crate) user_id: String,
    pub(crate) admin_id: String,
    pub(crate) last_message_id: Option<Uuid>,
    pub(crate) unread_count: i64,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

type ConversationTuple = (String, String, String, Option<String>, i64, i64, i64);

pub(crate) const CONVERSATION_COLUMNS: &str =
    "id,user_id,admin_id,last_message_id,unread_count,created_at,updated_at";

impl ConversationRow {
    pub(crate) fn from_tuple(
        (id, user_id, admin_id, last_message_id, unread_count, created_at, updated_at): ConversationTuple,
    ) -> AppResult<Self> {
        Ok(ConversationRow {
            id: parse_uuid(&id)?,
            user_id,
            admin_id,
            last_message_id: last_message_id.as_deref().map(parse_uuid).transpose()?,
            unread_count,
            created_at,
            updated_at,
        })
    }

    pub(crate) fn is_participant(&self, user_id: &str) -> bool {
        self.user_id == user_id || self.admin_id == user_id
    }
}

pub(crate) fn parse_uuid(s: &str) -> AppResult<Uuid> {
    Uuid::parse_str(s).map_err(|err| AppError::Internal(err.into()))
}

pub(crate) async fn conversation_row(
    db_pool: &SqlitePool,
    id: Uuid,
) -> AppResult<Option<ConversationRow>> {
    let row: Option<ConversationTuple> = sqlx::query_as(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id=?"
    ))
    .bind(id.to_string())
    .fetch_optional(db_pool)
    .await?;

    row.map(ConversationRow::from_tuple).transpose()
}

pub(crate) async fn user_ref(db_pool: &SqlitePool, id: &str) -> AppResult<Option<UserRef>> {
    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT id,name,role FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(db_pool)
            .await?;

    let Some((id, name, role)) = row else {
        return Ok(None);
    };

    Ok(Some(UserRef { id, name, role: role.parse()? }))
}

type MessageTuple = (String, String, String, String, String, i64, bool);

pub(crate) const MESSAGE_COLUMNS: &str =
    "id,conversation_id,sender_id,sender_type,text,timestamp,read";

pub(crate) fn message_from_tuple(
    (id, conversation_id, sender_id, sender_type, text, timestamp, read): MessageTuple,
) -> AppResult<Message> {
    Ok(Message {
        id: parse_uuid(&id)?,
        conversation: parse_uuid(&conversation_id)?,
        sender: sender_id,
        sender_type: sender_type.parse()?,
        text,
        timestamp,
        read,
    })
}

pub(crate) async fn fetch_message(db_pool: &SqlitePool, id: Uuid) -> AppResult<Option<Message>> {
    let row: Option<MessageTuple> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?"
    ))
    .bind(id.to_string())
    .fetch_optional(db_pool)
    .await?;

    row.map(message_from_tuple).transpose()
}

/// Joins a conversation row against the users and messages tables into the
/// shape the API serves.
pub(crate) async fn hydrate(db_pool: &SqlitePool, row: ConversationRow) -> AppResult<Conversation> {
    let user = user_ref(db_pool, &row.user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let admin = user_ref(db_pool, &row.admin_id)
        .await?
        .ok_or(AppError::NotFound("admin"))?;

    let last_message = match row.last_message_id {
        Some(id) => fetch_message(db_pool, id).await?,
        None => None,
    };

    Ok(Conversation {
        id: row.id,
        participants: vec![user, admin],
        last_message,
        unread_count: row.unread_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
