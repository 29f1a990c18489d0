//! Duplex seat channel.
//!
//! Each connection runs two tasks: the reader dispatches commands into
//! the room under its mutex, the writer drains the connection's bounded
//! outbound queue. Seat validation happens before the upgrade; a
//! missing room upgrades anyway so the browser client gets a structured
//! redirect instead of a bare handshake failure.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::Hub;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::{ConnHandle, Room, OUTBOUND_QUEUE};

/// Redirect hint carried by room_missing / seat_occupied messages.
const LOBBY_REDIRECT: &str = "#/lobby";

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let room_id = query.get("room").cloned().unwrap_or_default();
    let Some(room) = hub.room(&room_id) else {
        return ws.on_upgrade(send_room_missing);
    };

    let seat: usize = match query.get("seat").map(String::as_str).unwrap_or("").parse() {
        Ok(seat) => seat,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid seat").into_response(),
    };
    // TODO(seat-auth): require a per-seat token minted at room creation
    // so clients cannot impersonate an unconnected seat.
    if seat >= room.seat_count() {
        return (StatusCode::BAD_REQUEST, "invalid seat").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, hub, room, seat))
}

async fn send_room_missing(socket: WebSocket) {
    let (mut sink, _stream) = socket.split();
    let msg = ServerMessage::RoomMissing {
        error: "Room not found".to_string(),
        redirect: LOBBY_REDIRECT.to_string(),
    };
    send_direct(&mut sink, &msg).await;
    let _ = sink.close().await;
}

async fn send_direct(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = sink.send(Message::Text(json.into())).await;
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, room: Arc<Room>, seat: usize) {
    let (mut sink, mut stream) = socket.split();
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

    if !room.add_conn(seat, ConnHandle::new(conn_id, tx)) {
        let msg = ServerMessage::SeatOccupied {
            error: "Seat already occupied".to_string(),
            redirect: LOBBY_REDIRECT.to_string(),
        };
        send_direct(&mut sink, &msg).await;
        let _ = sink.close().await;
        return;
    }
    hub.notify_lobby();
    debug!(room_id = %room.id(), seat, conn = %conn_id, "seat connected");

    // Writer: drains the outbound queue until the room drops the sender
    // or a socket write fails.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to encode server message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    room.send_state(seat, conn_id);

    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Ok(client_msg) = serde_json::from_str::<ClientMessage>(msg.as_str()) else {
            debug!(room_id = %room.id(), seat, "dropping malformed client frame");
            break;
        };
        match client_msg {
            ClientMessage::State => room.send_state(seat, conn_id),
            ClientMessage::Pick {
                seq,
                pack_id,
                card_name,
                zone,
                picks,
            } => {
                if room.handle_pick(seat, conn_id, seq, &pack_id, &card_name, &zone, &picks) {
                    hub.notify_lobby();
                }
            }
            ClientMessage::MovePick {
                seq,
                card_name,
                from_zone,
                to_zone,
            } => {
                room.handle_move_pick(seat, conn_id, seq, &card_name, &from_zone, &to_zone);
            }
            ClientMessage::SetBasics { seq, basics } => {
                room.handle_set_basics(seat, conn_id, seq, basics);
            }
            // Ignore unknown client messages to keep write paths
            // serialized through the room handlers.
            ClientMessage::Unknown => continue,
        }
    }

    room.remove_conn(seat, conn_id);
    hub.notify_lobby();
    writer.abort();
    debug!(room_id = %room.id(), seat, conn = %conn_id, "seat disconnected");
}
