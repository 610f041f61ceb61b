use sqlx::SqlitePool;

use crate::chat::model::Role;

/// Creates the chat tables if they are missing. Conversations carry a
/// uniqueness constraint on the (user, admin) pair so that two racing
/// create-or-get calls converge on a single row.
pub async fn init(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id   TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user','admin'))
        )",
    )
    .execute(db_pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            admin_id        TEXT NOT NULL REFERENCES users(id),
            last_message_id TEXT,
            unread_count    INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            UNIQUE (user_id, admin_id)
        )",
    )
    .execute(db_pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            sender_type     TEXT NOT NULL CHECK (sender_type IN ('user','admin')),
            text            TEXT NOT NULL,
            timestamp       INTEGER NOT NULL,
            read            INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(db_pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS messages_by_conversation
         ON messages (conversation_id, timestamp)",
    )
    .execute(db_pool)
    .await?;

    Ok(())
}

pub async fn create_user(
    db_pool: &SqlitePool,
    id: &str,
    name: &str,
    role: Role,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO users (id,name,role) VALUES (?,?,?)")
        .bind(id)
        .bind(name)
        .bind(role.as_str())
        .execute(db_pool)
        .await?;
    Ok(())
}
