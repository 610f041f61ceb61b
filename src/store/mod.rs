//! HTTP client for the persistence gateway: durable reads and writes of
//! conversations and messages, decoupled from the realtime relay. Message
//! lists go through a five-second read-through cache to absorb bursty
//! re-fetches.

mod cache;

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::chat::model::{Conversation, Message, Role, UserRef};

use cache::MessageCache;

const MESSAGE_CACHE_TTL: Duration = Duration::from_secs(5);

/// Gateway failures, kept distinct so callers can branch on the outcome.
/// `Connection` means the gateway never answered; everything else is its
/// answer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("gateway failure: {0}")]
    Internal(String),
    #[error("gateway unreachable: {0}")]
    Connection(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadOutcome {
    pub success: bool,
    pub messages_updated: u64,
}

#[derive(Deserialize)]
struct ConversationsBody {
    conversations: Vec<Conversation>,
}

#[derive(Deserialize)]
struct ConversationBody {
    conversation: Conversation,
}

#[derive(Deserialize)]
struct MessagesBody {
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct MessageBody {
    message: Message,
}

#[derive(Deserialize)]
struct AdminsBody {
    admins: Vec<UserRef>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    cache: MessageCache,
}

impl StoreClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_cache_ttl(base_url, MESSAGE_CACHE_TTL)
    }

    /// Same client with a custom cache window; `Duration::ZERO` disables
    /// caching, which reads use when they must observe the latest write.
    pub fn with_cache_ttl(base_url: &str, ttl: Duration) -> Self {
        StoreClient {
            http: reqwest::Client::new(),
            base_url: base_url.to_owned(),
            cache: MessageCache::new(ttl),
        }
    }

    /// Conversations visible to the caller, most recent activity first.
    /// Admins see every conversation in the system; there is no pagination.
    pub async fn get_conversations(
        &self,
        user_id: &str,
        is_admin: bool,
    ) -> Result<Vec<Conversation>, StoreError> {
        let response = self
            .http
            .get(format!("{}/api/chat/conversations", self.base_url))
            .query(&[("userId", user_id), ("isAdmin", if is_admin { "true" } else { "false" })])
            .send()
            .await?;
        let body: ConversationsBody = take_body(response).await?;
        Ok(body.conversations)
    }

    /// Create-or-get the conversation pairing `user_id` with `admin_id` (or
    /// a gateway-chosen admin when none is given).
    pub async fn create_conversation(
        &self,
        user_id: &str,
        admin_id: Option<&str>,
    ) -> Result<Conversation, StoreError> {
        let response = self
            .http
            .post(format!("{}/api/chat/conversations", self.base_url))
            .json(&json!({ "userId": user_id, "adminId": admin_id }))
            .send()
            .await?;
        let body: ConversationBody = take_body(response).await?;
        Ok(body.conversation)
    }

    /// A conversation's messages, oldest first, served from cache while the
    /// last fetch is under five seconds old.
    pub async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        if let Some(messages) = self.cache.get(conversation_id) {
            tracing::debug!(conversation = %conversation_id, "serving cached messages");
            return Ok(messages);
        }

        let response = self
            .http
            .get(format!("{}/api/chat/messages", self.base_url))
            .query(&[("conversationId", conversation_id.to_string())])
            .send()
            .await?;
        let body: MessagesBody = take_body(response).await?;

        self.cache.put(conversation_id, body.messages.clone());
        Ok(body.messages)
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        text: &str,
        sender_type: Role,
    ) -> Result<Message, StoreError> {
        let response = self
            .http
            .post(format!("{}/api/chat/messages", self.base_url))
            .json(&json!({
                "conversationId": conversation_id,
                "senderId": sender_id,
                "text": text,
                "senderType": sender_type,
            }))
            .send()
            .await?;
        let body: MessageBody = take_body(response).await?;
        Ok(body.message)
    }

    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: &str,
    ) -> Result<MarkReadOutcome, StoreError> {
        let response = self
            .http
            .put(format!("{}/api/chat/read", self.base_url))
            .json(&json!({ "conversationId": conversation_id, "userId": user_id }))
            .send()
            .await?;
        take_body(response).await
    }

    /// The admins a user may be paired with (interface boundary for the rest
    /// of the application's user management).
    pub async fn get_admins(&self) -> Result<Vec<UserRef>, StoreError> {
        let response = self
            .http
            .get(format!("{}/api/users/admins", self.base_url))
            .send()
            .await?;
        let body: AdminsBody = take_body(response).await?;
        Ok(body.admins)
    }
}

async fn take_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(match status {
        reqwest::StatusCode::NOT_FOUND => StoreError::NotFound(message),
        reqwest::StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        reqwest::StatusCode::BAD_REQUEST => StoreError::Validation(message),
        _ => StoreError::Internal(message),
    })
}
