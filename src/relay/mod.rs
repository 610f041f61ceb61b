mod broker;
mod event;
mod ws;

pub use broker::{ConnId, Room, RoomBroker};
pub use event::{ClientEvent, ServerEvent};

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/socketio", get(ws::relay_ws))
}
