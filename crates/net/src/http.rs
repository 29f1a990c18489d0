//! HTTP surface: room create/list/delete and the lobby event stream.
//!
//! Bodies are decoded by hand so malformed JSON and missing fields both
//! come back as plain 400s. The lobby endpoint is server-sent events:
//! the full room list immediately, then a refreshed list on every hub
//! notification.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{self, Stream};

use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::protocol::{
    CreateRoomRequest, CreateRoomResponse, DeleteRoomResponse, ListRoomsResponse,
};
use crate::ws::ws_handler;

/// Seconds between SSE keepalive comments.
const LOBBY_KEEPALIVE_SECS: u64 = 20;

/// Build the draft API router.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route(
            "/api/draft/rooms",
            get(list_rooms).post(create_room).delete(delete_room),
        )
        .route("/api/draft/lobby", get(lobby_events))
        .route("/api/draft/ws", get(ws_handler))
        .with_state(hub)
}

fn is_valid_device_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Resolve the requester's device id from the `X-Device-ID` header or
/// the `device_id` query parameter.
fn requester_device_id(headers: &HeaderMap, query: &HashMap<String, String>) -> Result<String> {
    let mut candidate = headers
        .get("x-device-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .trim();
    if candidate.is_empty() {
        candidate = query.get("device_id").map(String::as_str).unwrap_or("").trim();
    }
    if !is_valid_device_id(candidate) {
        return Err(Error::InvalidDeviceId);
    }
    Ok(candidate.to_string())
}

async fn create_room(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<CreateRoomResponse>> {
    let req: CreateRoomRequest = serde_json::from_slice(&body).map_err(|_| Error::InvalidBody)?;
    let device_id = requester_device_id(&headers, &query)?;
    let room_id = hub.create_room(&req, &device_id)?;
    Ok(Json(CreateRoomResponse {
        room_id,
        created: true,
    }))
}

async fn list_rooms(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ListRoomsResponse>> {
    let device_id = requester_device_id(&headers, &query)?;
    Ok(Json(ListRoomsResponse {
        rooms: hub.list_room_summaries(&device_id),
    }))
}

async fn delete_room(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<DeleteRoomResponse>> {
    let room_id = query.get("room_id").cloned().unwrap_or_default();
    if room_id.is_empty() {
        return Err(Error::RoomIdRequired);
    }
    let device_id = requester_device_id(&headers, &query)?;
    hub.delete_room(&room_id, &device_id)?;
    Ok(Json(DeleteRoomResponse {
        room_id,
        deleted: true,
    }))
}

async fn lobby_events(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>> {
    let device_id = requester_device_id(&headers, &query)?;
    let subscription = Arc::clone(&hub).subscribe_lobby();

    // First iteration emits immediately; afterwards each emission waits
    // for a hub signal. The subscription unregisters when the client
    // disconnects and the stream is dropped.
    let stream = stream::unfold(
        (hub, subscription, device_id, true),
        |(hub, mut subscription, device_id, first)| async move {
            if !first && !subscription.changed().await {
                return None;
            }
            let event = room_list_event(&hub, &device_id)?;
            Some((Ok(event), (hub, subscription, device_id, false)))
        },
    );

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(LOBBY_KEEPALIVE_SECS))
            .text("ping"),
    ))
}

fn room_list_event(hub: &Hub, device_id: &str) -> Option<SseEvent> {
    let payload = ListRoomsResponse {
        rooms: hub.list_room_summaries(device_id),
    };
    let json = serde_json::to_string(&payload).ok()?;
    Some(SseEvent::default().data(json))
}
