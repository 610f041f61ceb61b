use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::model::{Message, Role};

use super::event::ServerEvent;

pub type ConnId = u64;

/// A named fan-out group. Rooms exist only while a connection is in them;
/// nothing here is persisted, and clients reconstruct their memberships by
/// reissuing joins after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    User(String),
    Admins,
    Conversation(Uuid),
}

struct Connection {
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<Room>,
}

#[derive(Default)]
struct Membership {
    next_id: ConnId,
    conns: HashMap<ConnId, Connection>,
    rooms: HashMap<Room, HashSet<ConnId>>,
}

impl Membership {
    fn join(&mut self, conn_id: ConnId, room: Room) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if conn.rooms.insert(room.clone()) {
            self.rooms.entry(room).or_default().insert(conn_id);
        }
    }

    fn leave(&mut self, conn_id: ConnId, room: &Room) {
        if let Some(conn) = self.conns.get_mut(&conn_id) {
            conn.rooms.remove(room);
        }
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Clone the event to every member of the room. A send only fails when
    /// the receiving half is already gone; the event is dropped for that
    /// recipient and the durable store remains the source of truth.
    fn send_to_room(&self, room: &Room, event: &ServerEvent) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for conn_id in members {
            if let Some(conn) = self.conns.get(conn_id) {
                let _ = conn.tx.send(event.clone());
            }
        }
    }

    fn send_to_conn(&self, conn_id: ConnId, event: ServerEvent) {
        if let Some(conn) = self.conns.get(&conn_id) {
            let _ = conn.tx.send(event);
        }
    }
}

/// Routes relay events between connections grouped by room, persisting
/// nothing. One broker exists per process, held in [`crate::AppState`];
/// every operation takes the membership lock, mutates or fans out, and
/// returns without awaiting, so handlers run to completion one at a time.
///
/// Delivery is at-most-once by design: there are no acks past `joined` and
/// no retries. Clients re-fetch from the gateway to recover.
pub struct RoomBroker {
    inner: Mutex<Membership>,
}

impl RoomBroker {
    pub fn new() -> Self {
        RoomBroker { inner: Mutex::new(Membership::default()) }
    }

    /// Register a connection. The returned receiver carries every event the
    /// broker addresses to it; dropping the receiver makes future deliveries
    /// silently no-op until [`disconnect`](Self::disconnect) cleans up.
    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let conn_id = inner.next_id;
        inner.next_id += 1;
        inner.conns.insert(conn_id, Connection { tx, rooms: HashSet::new() });
        tracing::debug!(conn = conn_id, "relay connection opened");
        (conn_id, rx)
    }

    /// Drop a connection and every room membership it held.
    pub fn disconnect(&self, conn_id: ConnId) {
        let mut inner = self.lock();
        let Some(conn) = inner.conns.remove(&conn_id) else {
            return;
        };
        for room in conn.rooms {
            if let Some(members) = inner.rooms.get_mut(&room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    inner.rooms.remove(&room);
                }
            }
        }
        tracing::debug!(conn = conn_id, "relay connection closed");
    }

    /// Put the connection in its personal room (and the shared admins room
    /// for admins), then ack with `joined` to the caller only. Idempotent.
    pub fn join(&self, conn_id: ConnId, user_id: &str, role: Role) {
        let mut inner = self.lock();
        inner.join(conn_id, Room::User(user_id.to_owned()));
        if role == Role::Admin {
            inner.join(conn_id, Room::Admins);
        }
        tracing::debug!(conn = conn_id, user = user_id, %role, "joined personal room");
        inner.send_to_conn(conn_id, ServerEvent::Joined {
            user_id: user_id.to_owned(),
            role,
        });
    }

    /// No access check happens here: holding a conversation id means the
    /// caller already got it past the gateway's participant checks.
    pub fn join_conversation(&self, conn_id: ConnId, conversation_id: Uuid) {
        self.lock().join(conn_id, Room::Conversation(conversation_id));
        tracing::debug!(conn = conn_id, conversation = %conversation_id, "joined conversation");
    }

    pub fn leave_conversation(&self, conn_id: ConnId, conversation_id: Uuid) {
        self.lock().leave(conn_id, &Room::Conversation(conversation_id));
        tracing::debug!(conn = conn_id, conversation = %conversation_id, "left conversation");
    }

    /// Fan `receive_message` out to the conversation room; when the sender is
    /// a user, also raise `new_user_message` for the admins room.
    pub fn relay_message(&self, conversation_id: Uuid, message: Message) {
        let inner = self.lock();
        let from_user = message.sender_type == Role::User;

        inner.send_to_room(
            &Room::Conversation(conversation_id),
            &ServerEvent::ReceiveMessage(message.clone()),
        );
        if from_user {
            inner.send_to_room(&Room::Admins, &ServerEvent::NewUserMessage {
                conversation_id,
                message,
            });
        }
        tracing::debug!(conversation = %conversation_id, from_user, "relayed message");
    }

    /// Fan `messages_read` out to the conversation room so the reader's peer
    /// can flip the read rendering on what it sent.
    pub fn relay_read(&self, conversation_id: Uuid, user_id: &str) {
        self.lock().send_to_room(
            &Room::Conversation(conversation_id),
            &ServerEvent::MessagesRead {
                conversation_id,
                user_id: user_id.to_owned(),
            },
        );
        tracing::debug!(conversation = %conversation_id, reader = user_id, "relayed read");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Membership> {
        // A poisoned membership table only happens if a handler panicked
        // mid-mutation; the table stays usable either way.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RoomBroker {
    fn default() -> Self {
        Self::new()
    }
}
