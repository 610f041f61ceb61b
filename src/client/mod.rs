//! Client-side session adapter: binds one relay connection and the message
//! store together behind the state a chat view renders. The relay side heals
//! itself by silently redoing the connect-and-join sequence and refetching
//! history; store failures surface to the caller so the UI can show them.

mod debounce;
mod state;

pub use debounce::Debounce;
pub use state::{Delivery, SessionState};

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use uuid::Uuid;

use crate::chat::model::{Conversation, Message, Role};
use crate::relay::{ClientEvent, ServerEvent};
use crate::store::{StoreClient, StoreError};

/// How long to wait for the `joined` ack before declaring the attempt dead
/// and redoing the whole connect-and-join sequence.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Fixed pause between reconnect attempts; retries are unbounded.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
/// Rapid read-receipt triggers inside this window collapse into one dispatch.
const READ_RECEIPT_WINDOW: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("relay connection failed: {0}")]
    Connection(#[from] tungstenite::Error),
    #[error("timed out waiting for join acknowledgement")]
    Timeout,
    #[error("relay closed before acknowledging join")]
    Closed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("relay sent invalid json: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("no conversation is open")]
    NoOpenConversation,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// ws:// url of the relay endpoint.
    pub relay_url: String,
    /// http:// base url of the persistence gateway.
    pub store_url: String,
    pub user_id: String,
    pub role: Role,
}

/// What a call to [`ChatSession::tick`] did, for the embedding UI to react to.
#[derive(Debug)]
pub enum SessionEvent {
    MessageAppended(Message),
    UnreadBumped(Uuid),
    PeerRead { conversation_id: Uuid, user_id: String },
    ReadReceiptsFlushed,
    Reconnected,
    Idle,
}

#[derive(Debug)]
pub struct ChatSession {
    config: SessionConfig,
    store: StoreClient,
    ws: WsStream,
    state: SessionState,
    read_receipts: Debounce,
    /// Conversations this session wants membership in; replayed against the
    /// broker after every reconnect, since the broker remembers nothing.
    desired_rooms: HashSet<Uuid>,
}

impl ChatSession {
    /// Connect and join, retrying silently until the relay answers.
    pub async fn connect(config: SessionConfig) -> ChatSession {
        let ws = Self::establish(&config, &HashSet::new()).await;
        Self::assemble(config, ws)
    }

    /// Single connect-and-join attempt, surfacing the failure instead of
    /// retrying.
    pub async fn try_connect(config: SessionConfig) -> Result<ChatSession, SessionError> {
        let ws = Self::handshake(&config, &HashSet::new()).await?;
        Ok(Self::assemble(config, ws))
    }

    fn assemble(config: SessionConfig, ws: WsStream) -> ChatSession {
        ChatSession {
            store: StoreClient::new(&config.store_url),
            state: SessionState::new(config.user_id.as_str(), config.role),
            read_receipts: Debounce::new(READ_RECEIPT_WINDOW),
            desired_rooms: HashSet::new(),
            config,
            ws,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    /// Create-or-get the conversation with `admin_id` (or a gateway-chosen
    /// admin) and open it. The user-role entry point.
    pub async fn open_with_admin(
        &mut self,
        admin_id: Option<&str>,
    ) -> Result<Conversation, SessionError> {
        let user_id = self.config.user_id.clone();
        let conversation = self.store.create_conversation(&user_id, admin_id).await?;
        self.open_conversation(conversation.id).await?;
        Ok(conversation)
    }

    /// Switch the session to a conversation: leave the previous room, join
    /// the new one, fetch history, and owe a read receipt if the peer has
    /// unread messages there.
    pub async fn open_conversation(&mut self, conversation_id: Uuid) -> Result<(), SessionError> {
        if let Some(previous) = self.state.open() {
            if previous == conversation_id {
                return Ok(());
            }
            self.emit(&ClientEvent::LeaveConversation(previous)).await?;
            self.desired_rooms.remove(&previous);
        }

        self.emit(&ClientEvent::JoinConversation(conversation_id)).await?;
        self.desired_rooms.insert(conversation_id);

        let history = self.store.get_messages(conversation_id).await?;
        self.state.open_conversation(conversation_id, history);
        if self.state.unread_from_peer() {
            self.read_receipts.trigger();
        }
        Ok(())
    }

    /// Durable write first, then optimistic local append, then the relay
    /// fan-out. The broker's echo of our own emit is deduplicated by id.
    pub async fn send_message(&mut self, text: &str) -> Result<Message, SessionError> {
        let conversation_id = self.state.open().ok_or(SessionError::NoOpenConversation)?;
        let user_id = self.config.user_id.clone();

        let message = self
            .store
            .send_message(conversation_id, &user_id, text, self.config.role)
            .await?;
        self.state.apply_message(&message);
        self.emit(&ClientEvent::NewMessage { conversation_id, message: message.clone() })
            .await?;
        Ok(message)
    }

    /// Drive the session one step: deliver the next relay event, flush a due
    /// read receipt, or heal a dropped connection.
    pub async fn tick(&mut self) -> Result<SessionEvent, SessionError> {
        enum Step {
            Incoming(WsMessage),
            ConnectionLost,
            Flush,
        }

        let deadline = self.read_receipts.deadline();
        let step = tokio::select! {
            frame = self.ws.next() => match frame {
                Some(Ok(frame)) => Step::Incoming(frame),
                Some(Err(_)) | None => Step::ConnectionLost,
            },
            _ = tokio::time::sleep_until(as_tokio_deadline(deadline)), if deadline.is_some() => {
                Step::Flush
            }
        };

        match step {
            Step::Incoming(WsMessage::Text(text)) => {
                let event = serde_json::from_str::<ServerEvent>(&text)?;
                Ok(self.apply(event))
            }
            Step::Incoming(WsMessage::Close(_)) | Step::ConnectionLost => {
                self.reconnect().await?;
                Ok(SessionEvent::Reconnected)
            }
            Step::Incoming(_) => Ok(SessionEvent::Idle),
            Step::Flush => {
                if self.read_receipts.take_due(Instant::now()) {
                    self.flush_read_receipts().await?;
                    Ok(SessionEvent::ReadReceiptsFlushed)
                } else {
                    Ok(SessionEvent::Idle)
                }
            }
        }
    }

    /// Leave the open room and close the socket. Skipping this would leak
    /// the room membership for the life of the connection.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if let Some(open) = self.state.open() {
            self.emit(&ClientEvent::LeaveConversation(open)).await?;
            self.desired_rooms.remove(&open);
            self.state.close_conversation();
            self.read_receipts.cancel();
        }
        let _ = self.ws.close(None).await;
        Ok(())
    }

    fn apply(&mut self, event: ServerEvent) -> SessionEvent {
        match event {
            ServerEvent::Joined { .. } => SessionEvent::Idle,
            ServerEvent::ReceiveMessage(message) => match self.state.apply_message(&message) {
                Delivery::Appended { from_peer } => {
                    if from_peer {
                        self.read_receipts.trigger();
                    }
                    SessionEvent::MessageAppended(message)
                }
                Delivery::Duplicate | Delivery::NotOpen => SessionEvent::Idle,
            },
            ServerEvent::NewUserMessage { conversation_id, .. } => {
                if self.state.open() == Some(conversation_id) {
                    // The conversation room delivery already covers it.
                    SessionEvent::Idle
                } else {
                    self.state.note_unread(conversation_id);
                    SessionEvent::UnreadBumped(conversation_id)
                }
            }
            ServerEvent::MessagesRead { conversation_id, user_id } => {
                self.state.apply_read(conversation_id, &user_id);
                SessionEvent::PeerRead { conversation_id, user_id }
            }
        }
    }

    /// Mark the thread read durably and tell the room about it, together, as
    /// the debounced receipt dispatch.
    async fn flush_read_receipts(&mut self) -> Result<(), SessionError> {
        let Some(conversation_id) = self.state.open() else {
            return Ok(());
        };
        let user_id = self.config.user_id.clone();
        self.store.mark_read(conversation_id, &user_id).await?;
        self.emit(&ClientEvent::MarkRead { conversation_id, user_id }).await?;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), SessionError> {
        tracing::info!(user = %self.config.user_id, "relay connection lost, reconnecting");
        self.ws = Self::establish(&self.config, &self.desired_rooms).await;

        // The durable store is the source of truth for whatever the dead
        // connection failed to deliver.
        if let Some(open) = self.state.open() {
            let history = self.store.get_messages(open).await?;
            self.state.open_conversation(open, history);
            if self.state.unread_from_peer() {
                self.read_receipts.trigger();
            }
        }
        Ok(())
    }

    async fn emit(&mut self, event: &ClientEvent) -> Result<(), SessionError> {
        let text = serde_json::to_string(event)?;
        self.ws.send(WsMessage::text(text)).await?;
        Ok(())
    }

    /// Retry [`handshake`](Self::handshake) forever with a fixed backoff.
    async fn establish(config: &SessionConfig, desired: &HashSet<Uuid>) -> WsStream {
        loop {
            match Self::handshake(config, desired).await {
                Ok(ws) => return ws,
                Err(err) => {
                    tracing::warn!(user = %config.user_id, "relay connect failed, retrying: {err}");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    /// One connect-and-join pass: open the socket, announce ourselves, wait
    /// (bounded) for the `joined` ack, then replay desired room memberships.
    async fn handshake(
        config: &SessionConfig,
        desired: &HashSet<Uuid>,
    ) -> Result<WsStream, SessionError> {
        let (mut ws, _) = connect_async(&config.relay_url).await?;

        let join = ClientEvent::Join {
            user_id: config.user_id.clone(),
            role: config.role,
        };
        ws.send(WsMessage::text(serde_json::to_string(&join)?)).await?;

        let acked = tokio::time::timeout(JOIN_TIMEOUT, async {
            while let Some(frame) = ws.next().await {
                let WsMessage::Text(text) = frame? else {
                    continue;
                };
                if let Ok(ServerEvent::Joined { .. }) = serde_json::from_str::<ServerEvent>(&text) {
                    return Ok::<bool, SessionError>(true);
                }
            }
            Ok(false)
        })
        .await
        .map_err(|_| SessionError::Timeout)??;

        if !acked {
            return Err(SessionError::Closed);
        }

        for conversation_id in desired {
            let rejoin = ClientEvent::JoinConversation(*conversation_id);
            ws.send(WsMessage::text(serde_json::to_string(&rejoin)?)).await?;
        }

        tracing::debug!(user = %config.user_id, "joined relay");
        Ok(ws)
    }
}

fn as_tokio_deadline(deadline: Option<Instant>) -> tokio::time::Instant {
    match deadline {
        Some(deadline) => tokio::time::Instant::from_std(deadline),
        // Unused: the select branch is disabled when nothing is armed.
        None => tokio::time::Instant::now(),
    }
}
