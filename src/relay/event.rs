//! Wire protocol for the realtime relay. Events are JSON objects of the form
//! `{"event": "...", "data": ...}` with the field names the web client
//! already speaks (camelCase).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::model::{Message, Role};

/// Events a connection may submit to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Join { user_id: String, role: Role },
    JoinConversation(Uuid),
    LeaveConversation(Uuid),
    #[serde(rename_all = "camelCase")]
    NewMessage { conversation_id: Uuid, message: Message },
    #[serde(rename_all = "camelCase")]
    MarkRead { conversation_id: Uuid, user_id: String },
}

/// Events the broker pushes to connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Ack for [`ClientEvent::Join`], sent to the caller only. The only
    /// completion signal the protocol has; clients bound a wait on it.
    #[serde(rename_all = "camelCase")]
    Joined { user_id: String, role: Role },
    /// Delivered to everyone in the conversation room.
    ReceiveMessage(Message),
    /// Delivered to the admins room when the sender is a user, so admins
    /// watching other conversations still learn of the activity.
    #[serde(rename_all = "camelCase")]
    NewUserMessage { conversation_id: Uuid, message: Message },
    /// Delivered to the conversation room so peers can flip their local
    /// read rendering.
    #[serde(rename_all = "camelCase")]
    MessagesRead { conversation_id: Uuid, user_id: String },
}
