//! Wire protocol for the draft transport surface
//!
//! All messages are JSON with a `type` discriminator. The duplex seat
//! channel uses [`ClientMessage`]/[`ServerMessage`]; the REST endpoints
//! use the request/response structs below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use draftden_core::draft::{DraftPhase, PickSelection, PlayerState};

/// Client → server messages on the duplex seat channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a fresh seat-local state.
    State,
    /// Pick command: single-card form (`card_name` + `zone`) or batch
    /// form (`picks`), required when the pass expects more than one.
    Pick {
        #[serde(default)]
        seq: u64,
        #[serde(default)]
        pack_id: String,
        #[serde(default)]
        card_name: String,
        #[serde(default)]
        zone: String,
        #[serde(default)]
        picks: Vec<PickSelection>,
    },
    MovePick {
        #[serde(default)]
        seq: u64,
        #[serde(default)]
        card_name: String,
        #[serde(default)]
        from_zone: String,
        #[serde(default)]
        to_zone: String,
    },
    SetBasics {
        #[serde(default)]
        seq: u64,
        #[serde(default)]
        basics: BTreeMap<String, u32>,
    },
    /// Unknown client types are ignored so write paths stay serialized
    /// through the room handlers.
    #[serde(other)]
    Unknown,
}

/// Server → client messages on the duplex seat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    State {
        state: PlayerState,
    },
    /// Ack for pick/move/basics commands, addressed to the sender only.
    PickAccepted {
        state: PlayerState,
        duplicate: bool,
    },
    /// Broadcast to every seat after a pass completes.
    RoundAdvanced {
        pack_no: usize,
        pick_no: usize,
    },
    DraftCompleted,
    Error {
        error: String,
    },
    RoomMissing {
        error: String,
        redirect: String,
    },
    SeatOccupied {
        error: String,
        redirect: String,
    },
}

/// Body of `POST /api/draft/rooms`. Counts default to zero and are
/// validated by the hub, so a missing mandatory field reads as invalid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub deck: Vec<String>,
    #[serde(default)]
    pub deck_slug: String,
    #[serde(default)]
    pub seat_count: usize,
    #[serde(default)]
    pub pack_count: usize,
    #[serde(default)]
    pub pack_size: usize,
    #[serde(default)]
    pub pass_pattern: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRoomResponse {
    pub room_id: String,
    pub deleted: bool,
}

/// One row of the lobby listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deck_slug: String,
    pub seat_count: usize,
    pub pack_count: usize,
    pub pack_size: usize,
    pub state: DraftPhase,
    pub pack_no: usize,
    pub pick_no: usize,
    pub owned_by_requester: bool,
    pub connected_seats: usize,
    pub connections: usize,
    pub occupied_seats: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRoomsResponse {
    pub rooms: Vec<RoomSummary>,
}
