//! One draft room: the authoritative draft plus its seat connections.
//!
//! The room mutex is the single serializer for the draft. Outbound
//! traffic goes through per-connection bounded queues; a reader that
//! falls behind is dropped rather than allowed to stall the room.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use draftden_core::draft::{Draft, Event, PickSelection};
use draftden_core::RoomRecord;

use crate::protocol::{RoomSummary, ServerMessage};

/// Outbound queue capacity per connection.
pub(crate) const OUTBOUND_QUEUE: usize = 64;

/// Sender half of one connection's outbound queue.
pub struct ConnHandle {
    pub id: Uuid,
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnHandle {
    pub fn new(id: Uuid, tx: mpsc::Sender<ServerMessage>) -> Self {
        ConnHandle { id, tx }
    }
}

pub struct Room {
    id: String,
    deck_slug: String,
    owner_device_id: String,
    inner: Mutex<RoomInner>,
}

struct RoomInner {
    draft: Draft,
    /// seat → live connections. The seat-exclusive rule keeps each
    /// inner map at size at most one.
    clients: HashMap<usize, HashMap<Uuid, mpsc::Sender<ServerMessage>>>,
}

impl Room {
    pub fn new(id: String, deck_slug: String, owner_device_id: String, draft: Draft) -> Self {
        Room {
            id,
            deck_slug,
            owner_device_id,
            inner: Mutex::new(RoomInner {
                draft,
                clients: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_device_id(&self) -> &str {
        &self.owner_device_id
    }

    pub fn seat_count(&self) -> usize {
        self.lock().draft.config().seat_count
    }

    fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a connection for a seat. Rejected when the seat already
    /// holds a live connection: exactly one socket per seat is what
    /// makes per-seat command order trivial.
    pub fn add_conn(&self, seat: usize, conn: ConnHandle) -> bool {
        let mut inner = self.lock();
        let seat_conns = inner.clients.entry(seat).or_default();
        if !seat_conns.is_empty() {
            return false;
        }
        seat_conns.insert(conn.id, conn.tx);
        true
    }

    pub fn remove_conn(&self, seat: usize, conn_id: Uuid) {
        let mut inner = self.lock();
        if let Some(seat_conns) = inner.clients.get_mut(&seat) {
            seat_conns.remove(&conn_id);
            if seat_conns.is_empty() {
                inner.clients.remove(&seat);
            }
        }
    }

    /// Drop every connection. Dropping the senders ends each
    /// connection's writer task, which closes its socket.
    pub fn close_all(&self) {
        self.lock().clients.clear();
    }

    /// Send the seat's current state to one connection.
    pub fn send_state(&self, seat: usize, conn_id: Uuid) {
        let mut inner = self.lock();
        let msg = match inner.draft.player_state(seat) {
            Ok(state) => ServerMessage::State { state },
            Err(err) => ServerMessage::Error {
                error: err.to_string(),
            },
        };
        inner.send_to(seat, conn_id, msg);
    }

    /// Apply a pick command and fan out the results. Returns true when
    /// the draft actually advanced (drives lobby notification).
    pub fn handle_pick(
        &self,
        seat: usize,
        conn_id: Uuid,
        seq: u64,
        pack_id: &str,
        card_name: &str,
        zone: &str,
        picks: &[PickSelection],
    ) -> bool {
        let mut inner = self.lock();

        if seq == 0 || pack_id.is_empty() {
            inner.send_error(seat, conn_id, "missing pick fields");
            return false;
        }
        // Fold the single-card form into a batch of one. Zone strings
        // pass through untouched; the engine validates them in order.
        let mut selections = picks.to_vec();
        if selections.is_empty() {
            if card_name.is_empty() || zone.is_empty() {
                inner.send_error(seat, conn_id, "missing pick fields");
                return false;
            }
            selections.push(PickSelection {
                card_name: card_name.to_string(),
                zone: zone.to_string(),
            });
        }

        let result = match inner.draft.pick_batch(seat, seq, pack_id, &selections) {
            Ok(result) => result,
            Err(err) => {
                inner.send_error(seat, conn_id, &err.to_string());
                return false;
            }
        };

        inner.send_to(
            seat,
            conn_id,
            ServerMessage::PickAccepted {
                state: result.state,
                duplicate: result.duplicate,
            },
        );
        if result.duplicate {
            return false;
        }

        let mut round_advanced = false;
        for event in &result.events {
            match *event {
                Event::RoundAdvanced {
                    pack_number,
                    pick_number,
                } => {
                    round_advanced = true;
                    inner.broadcast(ServerMessage::RoundAdvanced {
                        pack_no: pack_number,
                        pick_no: pick_number,
                    });
                }
                Event::DraftCompleted => {
                    inner.broadcast(ServerMessage::DraftCompleted);
                }
            }
        }
        if round_advanced {
            inner.broadcast_seat_states();
        }
        true
    }

    /// Move one picked card between zones; ack goes to the sender only.
    pub fn handle_move_pick(
        &self,
        seat: usize,
        conn_id: Uuid,
        seq: u64,
        card_name: &str,
        from_zone: &str,
        to_zone: &str,
    ) {
        let mut inner = self.lock();

        if seq == 0 || card_name.is_empty() {
            inner.send_error(seat, conn_id, "missing move fields");
            return;
        }

        match inner.draft.move_pick(seat, seq, card_name, from_zone, to_zone) {
            Ok(result) => inner.send_to(
                seat,
                conn_id,
                ServerMessage::PickAccepted {
                    state: result.state,
                    duplicate: result.duplicate,
                },
            ),
            Err(err) => inner.send_error(seat, conn_id, &err.to_string()),
        }
    }

    /// Record the seat's basic-land counts; ack to the sender only.
    pub fn handle_set_basics(
        &self,
        seat: usize,
        conn_id: Uuid,
        seq: u64,
        basics: std::collections::BTreeMap<String, u32>,
    ) {
        let mut inner = self.lock();

        if seq == 0 {
            inner.send_error(seat, conn_id, "missing basics fields");
            return;
        }

        match inner.draft.set_basics(seat, seq, basics) {
            Ok(result) => inner.send_to(
                seat,
                conn_id,
                ServerMessage::PickAccepted {
                    state: result.state,
                    duplicate: result.duplicate,
                },
            ),
            Err(err) => inner.send_error(seat, conn_id, &err.to_string()),
        }
    }

    pub fn summary(&self, requester_device_id: &str) -> RoomSummary {
        let inner = self.lock();

        let connected_seats = inner
            .clients
            .values()
            .filter(|conns| !conns.is_empty())
            .count();
        let connections = inner.clients.values().map(HashMap::len).sum();
        let mut occupied_seats: Vec<usize> = inner
            .clients
            .iter()
            .filter(|(_, conns)| !conns.is_empty())
            .map(|(&seat, _)| seat)
            .collect();
        occupied_seats.sort_unstable();

        RoomSummary {
            room_id: self.id.clone(),
            deck_slug: self.deck_slug.clone(),
            seat_count: inner.draft.config().seat_count,
            pack_count: inner.draft.config().pack_count,
            pack_size: inner.draft.config().pack_size,
            state: inner.draft.phase(),
            pack_no: inner.draft.progress().pack_number,
            pick_no: inner.draft.current_pick_no(),
            owned_by_requester: !requester_device_id.is_empty()
                && requester_device_id == self.owner_device_id,
            connected_seats,
            connections,
            occupied_seats,
        }
    }

    /// Snapshot this room for persistence.
    pub fn snapshot_record(&self) -> RoomRecord {
        let inner = self.lock();
        let mut snapshot = inner.draft.to_snapshot();
        snapshot.owner_device_id = self.owner_device_id.clone();
        RoomRecord {
            room_id: self.id.clone(),
            deck_slug: self.deck_slug.clone(),
            owner_device_id: self.owner_device_id.clone(),
            snapshot,
        }
    }
}

impl RoomInner {
    /// Queue a message for one connection. A full or closed queue means
    /// the reader is gone or wedged; the connection is dropped.
    fn send_to(&mut self, seat: usize, conn_id: Uuid, msg: ServerMessage) {
        let Some(seat_conns) = self.clients.get_mut(&seat) else {
            return;
        };
        let Some(tx) = seat_conns.get(&conn_id) else {
            return;
        };
        if tx.try_send(msg).is_err() {
            warn!(seat, conn = %conn_id, "outbound queue stalled, dropping connection");
            seat_conns.remove(&conn_id);
            if seat_conns.is_empty() {
                self.clients.remove(&seat);
            }
        }
    }

    fn send_error(&mut self, seat: usize, conn_id: Uuid, message: &str) {
        self.send_to(
            seat,
            conn_id,
            ServerMessage::Error {
                error: message.to_string(),
            },
        );
    }

    fn broadcast(&mut self, msg: ServerMessage) {
        let mut dead = Vec::new();
        for (&seat, seat_conns) in &self.clients {
            for (&conn_id, tx) in seat_conns {
                if tx.try_send(msg.clone()).is_err() {
                    dead.push((seat, conn_id));
                }
            }
        }
        self.prune(dead);
    }

    /// Refresh every connected seat with its own view.
    fn broadcast_seat_states(&mut self) {
        let mut dead = Vec::new();
        for (&seat, seat_conns) in &self.clients {
            let msg = match self.draft.player_state(seat) {
                Ok(state) => ServerMessage::State { state },
                Err(err) => ServerMessage::Error {
                    error: err.to_string(),
                },
            };
            for (&conn_id, tx) in seat_conns {
                if tx.try_send(msg.clone()).is_err() {
                    dead.push((seat, conn_id));
                }
            }
        }
        self.prune(dead);
    }

    fn prune(&mut self, dead: Vec<(usize, Uuid)>) {
        for (seat, conn_id) in dead {
            warn!(seat, conn = %conn_id, "outbound queue stalled, dropping connection");
            if let Some(seat_conns) = self.clients.get_mut(&seat) {
                seat_conns.remove(&conn_id);
                if seat_conns.is_empty() {
                    self.clients.remove(&seat);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftden_core::draft::{DraftConfig, DraftPhase};

    fn make_room(pack_count: usize, pack_size: usize, seat_count: usize) -> Room {
        let deck: Vec<String> = (0..pack_count * pack_size * seat_count)
            .map(|i| format!("C{i:03}"))
            .collect();
        let draft = Draft::new(
            DraftConfig {
                pack_count,
                pack_size,
                seat_count,
                pass_pattern: Vec::new(),
            },
            &deck,
        )
        .expect("draft construction");
        Room::new(
            "plucky-rabbit".to_string(),
            "tempo".to_string(),
            "device-a".to_string(),
            draft,
        )
    }

    fn connect(room: &Room, seat: usize) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let conn_id = Uuid::new_v4();
        assert!(room.add_conn(seat, ConnHandle::new(conn_id, tx)));
        (conn_id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn active_pack(room: &Room, seat: usize) -> (String, Vec<String>) {
        let inner = room.lock();
        let state = inner.draft.player_state(seat).expect("player state");
        let pack = state.active_pack.expect("active pack");
        (pack.pack_id, pack.cards)
    }

    #[test]
    fn seat_exclusive_connections() {
        let room = make_room(1, 1, 2);
        let (_, _rx) = connect(&room, 0);

        let (tx, _rx2) = mpsc::channel(OUTBOUND_QUEUE);
        assert!(!room.add_conn(0, ConnHandle::new(Uuid::new_v4(), tx)));

        let summary = room.summary("device-a");
        assert_eq!(summary.connected_seats, 1);
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.occupied_seats, vec![0]);
        assert!(summary.owned_by_requester);
        assert!(!room.summary("device-b").owned_by_requester);
    }

    #[test]
    fn pick_acks_sender_and_broadcasts_round_advance() {
        let room = make_room(1, 1, 2);
        let (conn0, mut rx0) = connect(&room, 0);
        let (conn1, mut rx1) = connect(&room, 1);

        let (pack_id, cards) = active_pack(&room, 0);
        let advanced = room.handle_pick(0, conn0, 1, &pack_id, &cards[0], "mainboard", &[]);
        assert!(advanced);

        // Seat 0 only got its ack; no round yet.
        let messages = drain(&mut rx0);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            ServerMessage::PickAccepted { duplicate: false, .. }
        ));
        assert!(drain(&mut rx1).is_empty());

        let (pack_id, cards) = active_pack(&room, 1);
        assert!(room.handle_pick(1, conn1, 1, &pack_id, &cards[0], "mainboard", &[]));

        // One-pack draft: ack, then round_advanced + draft_completed +
        // fresh state fan out to everyone.
        let seat1 = drain(&mut rx1);
        assert!(matches!(seat1[0], ServerMessage::PickAccepted { .. }));
        assert!(seat1
            .iter()
            .any(|msg| matches!(msg, ServerMessage::RoundAdvanced { .. })));
        assert!(seat1
            .iter()
            .any(|msg| matches!(msg, ServerMessage::DraftCompleted)));

        let seat0 = drain(&mut rx0);
        assert!(seat0
            .iter()
            .any(|msg| matches!(msg, ServerMessage::RoundAdvanced { .. })));
        assert!(seat0.iter().any(|msg| matches!(
            msg,
            ServerMessage::State { state } if state.state == DraftPhase::Done
        )));
    }

    #[test]
    fn invalid_pick_reports_error_without_broadcast() {
        let room = make_room(1, 2, 2);
        let (conn0, mut rx0) = connect(&room, 0);
        let (_conn1, mut rx1) = connect(&room, 1);

        let advanced = room.handle_pick(0, conn0, 1, "wrong_pack", "Ghost", "mainboard", &[]);
        assert!(!advanced);

        let messages = drain(&mut rx0);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            ServerMessage::Error { error } if error == "pack mismatch"
        ));
        assert!(drain(&mut rx1).is_empty());
    }

    #[test]
    fn missing_pick_fields_rejected() {
        let room = make_room(1, 2, 2);
        let (conn0, mut rx0) = connect(&room, 0);

        room.handle_pick(0, conn0, 0, "p0_s0", "Bolt", "mainboard", &[]);
        room.handle_pick(0, conn0, 1, "p0_s0", "", "", &[]);

        let messages = drain(&mut rx0);
        assert_eq!(messages.len(), 2);
        for msg in messages {
            assert!(matches!(
                msg,
                ServerMessage::Error { error } if error == "missing pick fields"
            ));
        }
    }

    #[test]
    fn bad_zone_string_reports_invalid_zone() {
        let room = make_room(1, 2, 2);
        let (conn0, mut rx0) = connect(&room, 0);

        let (pack_id, cards) = active_pack(&room, 0);
        room.handle_pick(0, conn0, 1, &pack_id, &cards[0], "graveyard", &[]);

        let messages = drain(&mut rx0);
        assert!(matches!(
            &messages[0],
            ServerMessage::Error { error } if error == "invalid pick zone"
        ));
    }

    #[test]
    fn seq_and_pack_problems_outrank_bad_zone() {
        let room = make_room(1, 2, 2);
        let (conn0, mut rx0) = connect(&room, 0);

        // The zone string is only inspected once the seq and pack checks
        // have passed, so these report the earlier violation.
        let (pack_id, cards) = active_pack(&room, 0);
        room.handle_pick(0, conn0, 5, &pack_id, &cards[0], "graveyard", &[]);
        room.handle_pick(0, conn0, 1, "wrong_pack", &cards[0], "graveyard", &[]);
        room.handle_move_pick(0, conn0, 9, &cards[0], "mainboard", "graveyard");

        let messages = drain(&mut rx0);
        assert_eq!(messages.len(), 3);
        assert!(matches!(
            &messages[0],
            ServerMessage::Error { error } if error == "seq gap"
        ));
        assert!(matches!(
            &messages[1],
            ServerMessage::Error { error } if error == "pack mismatch"
        ));
        assert!(matches!(
            &messages[2],
            ServerMessage::Error { error } if error == "seq gap"
        ));
    }

    #[test]
    fn move_pick_acks_without_broadcast() {
        let room = make_room(1, 1, 2);
        let (conn0, mut rx0) = connect(&room, 0);
        let (_conn1, mut rx1) = connect(&room, 1);

        let (pack_id, cards) = active_pack(&room, 0);
        room.handle_pick(0, conn0, 1, &pack_id, &cards[0], "mainboard", &[]);
        drain(&mut rx0);
        drain(&mut rx1);

        room.handle_move_pick(0, conn0, 2, &cards[0], "mainboard", "sideboard");
        let messages = drain(&mut rx0);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ServerMessage::PickAccepted { state, duplicate } => {
                assert!(!duplicate);
                assert_eq!(state.picks.sideboard, vec![cards[0].clone()]);
            }
            other => panic!("wrong ack: {other:?}"),
        }
        assert!(drain(&mut rx1).is_empty());
    }

    #[test]
    fn set_basics_acks_sender() {
        let room = make_room(1, 2, 2);
        let (conn0, mut rx0) = connect(&room, 0);

        let mut basics = std::collections::BTreeMap::new();
        basics.insert("Forest".to_string(), 10u32);
        room.handle_set_basics(0, conn0, 1, basics.clone());

        let messages = drain(&mut rx0);
        match &messages[0] {
            ServerMessage::PickAccepted { state, .. } => {
                assert_eq!(state.basics, basics);
            }
            other => panic!("wrong ack: {other:?}"),
        }
    }

    #[test]
    fn close_all_drops_every_sender() {
        let room = make_room(1, 1, 2);
        let (_conn0, mut rx0) = connect(&room, 0);
        let (_conn1, mut rx1) = connect(&room, 1);

        room.close_all();
        assert!(matches!(
            rx0.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(
            rx1.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(room.summary("device-a").connections, 0);
    }

    #[test]
    fn stalled_connection_is_dropped_on_send() {
        let room = make_room(1, 2, 2);
        let (tx, _rx) = mpsc::channel(1);
        let conn_id = Uuid::new_v4();
        assert!(room.add_conn(0, ConnHandle::new(conn_id, tx)));

        // Fill the single-slot queue, then force one more send.
        room.send_state(0, conn_id);
        room.send_state(0, conn_id);
        assert_eq!(room.summary("device-a").connections, 0);
    }

    #[test]
    fn snapshot_record_carries_room_identity() {
        let room = make_room(1, 2, 2);
        let record = room.snapshot_record();
        assert_eq!(record.room_id, "plucky-rabbit");
        assert_eq!(record.deck_slug, "tempo");
        assert_eq!(record.owner_device_id, "device-a");
        assert_eq!(record.snapshot.owner_device_id, "device-a");
    }
}
