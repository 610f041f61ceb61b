use std::collections::HashMap;

use uuid::Uuid;

use crate::chat::model::{Message, Role};

/// What applying an incoming message did to the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Appended to the open conversation. `from_peer` is true when the
    /// sender sits on the other side, which is what warrants a read receipt.
    Appended { from_peer: bool },
    /// Already present (the optimistic local append and the relay echo both
    /// land here); dropped.
    Duplicate,
    /// Not the open conversation; ignored.
    NotOpen,
}

/// The UI-facing view a session renders: the open conversation's messages
/// plus unread badges for the rest. Pure state transitions, no IO.
#[derive(Debug)]
pub struct SessionState {
    user_id: String,
    role: Role,
    open: Option<Uuid>,
    messages: Vec<Message>,
    unread: HashMap<Uuid, u64>,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        SessionState {
            user_id: user_id.into(),
            role,
            open: None,
            messages: Vec::new(),
            unread: HashMap::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn open(&self) -> Option<Uuid> {
        self.open
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn unread_badge(&self, conversation_id: Uuid) -> u64 {
        self.unread.get(&conversation_id).copied().unwrap_or(0)
    }

    /// Switch the view to `conversation_id`, replacing the message list with
    /// freshly fetched history and clearing the badge.
    pub fn open_conversation(&mut self, conversation_id: Uuid, history: Vec<Message>) {
        self.open = Some(conversation_id);
        self.messages = history;
        self.unread.remove(&conversation_id);
    }

    pub fn close_conversation(&mut self) {
        self.open = None;
        self.messages.clear();
    }

    /// Fold a live or optimistically sent message into the open view,
    /// deduplicating by message id.
    pub fn apply_message(&mut self, message: &Message) -> Delivery {
        if self.open != Some(message.conversation) {
            return Delivery::NotOpen;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return Delivery::Duplicate;
        }

        let from_peer = message.sender_type != self.role;
        self.messages.push(message.clone());
        Delivery::Appended { from_peer }
    }

    /// Bump the unread badge for activity in a conversation that is not on
    /// screen (the message body is not fetched for this).
    pub fn note_unread(&mut self, conversation_id: Uuid) {
        if self.open == Some(conversation_id) {
            return;
        }
        *self.unread.entry(conversation_id).or_insert(0) += 1;
    }

    /// The peer read the thread: flip the read flag on everything we sent.
    pub fn apply_read(&mut self, conversation_id: Uuid, reader_id: &str) {
        if self.open != Some(conversation_id) || reader_id == self.user_id {
            return;
        }
        for message in &mut self.messages {
            if message.sender == self.user_id {
                message.read = true;
            }
        }
    }

    /// Whether the open history holds unread messages from the peer, i.e.
    /// whether mounting this view owes the peer a read receipt.
    pub fn unread_from_peer(&self) -> bool {
        self.messages
            .iter()
            .any(|m| !m.read && m.sender != self.user_id)
    }
}
