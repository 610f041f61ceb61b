use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use super::broker::{ConnId, RoomBroker};
use super::event::ClientEvent;

/// GET /api/socketio: one relay connection per client. The socket is split:
/// a pushed task drains the broker's channel into the sink while this task
/// reads client events and dispatches them.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn relay_ws(
    State(broker): State<Arc<RoomBroker>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        let (conn_id, mut rx) = broker.connect();
        let (mut sender, mut receiver) = stream.split();

        let mut push_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if sender.send(text.into()).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                msg = receiver.next() => {
                    let Some(Ok(msg)) = msg else {
                        break;
                    };
                    match serde_json::from_slice::<ClientEvent>(&msg.into_data()) {
                        Ok(event) => dispatch(&broker, conn_id, event),
                        // Close frames and malformed payloads both land here;
                        // the relay ignores what it cannot parse.
                        Err(_) => continue,
                    }
                }
                _ = &mut push_task => break,
            }
        }

        broker.disconnect(conn_id);
        push_task.abort();
    })
}

fn dispatch(broker: &RoomBroker, conn_id: ConnId, event: ClientEvent) {
    match event {
        ClientEvent::Join { user_id, role } => broker.join(conn_id, &user_id, role),
        ClientEvent::JoinConversation(id) => broker.join_conversation(conn_id, id),
        ClientEvent::LeaveConversation(id) => broker.leave_conversation(conn_id, id),
        ClientEvent::NewMessage { conversation_id, message } => {
            broker.relay_message(conversation_id, message)
        }
        ClientEvent::MarkRead { conversation_id, user_id } => {
            broker.relay_read(conversation_id, &user_id)
        }
    }
}
