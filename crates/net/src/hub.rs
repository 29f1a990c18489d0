//! Room registry, admission control, and lobby notification.
//!
//! The hub owns the room map and nothing inside it: rooms serialize
//! their own drafts. Lock hierarchy is strictly hub → room, and no lock
//! is held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use draftden_core::draft::{Draft, DraftConfig};
use draftden_core::{RoomRecord, RoomStore};

use crate::error::{Error, Result};
use crate::protocol::{CreateRoomRequest, RoomSummary};
use crate::room::Room;
use crate::room_id::next_room_id;

#[derive(Default)]
pub struct Hub {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    lobby_subs: Mutex<HashMap<Uuid, mpsc::Sender<()>>>,
    store: RwLock<Option<Arc<RoomStore>>>,
}

impl Hub {
    pub fn new() -> Self {
        Hub::default()
    }

    /// Attach the snapshot store. Done after construction so tests and
    /// store-less deployments can run without one.
    pub fn set_store(&self, store: Arc<RoomStore>) {
        *self.write_store() = Some(store);
    }

    fn read_rooms(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_rooms(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, Option<Arc<RoomStore>>> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self) -> Option<Arc<RoomStore>> {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Admit a new room for `device_id`, enforcing one room per owner.
    /// Returns the fresh room id.
    pub fn create_room(&self, req: &CreateRoomRequest, device_id: &str) -> Result<String> {
        if req.seat_count == 0 {
            return Err(Error::Validation("seat_count must be > 0"));
        }
        if req.pack_count == 0 {
            return Err(Error::Validation("pack_count must be > 0"));
        }
        if req.pack_size == 0 {
            return Err(Error::Validation("pack_size must be > 0"));
        }

        // Shuffling and dealing happen outside the registry lock.
        let draft = Draft::new(
            DraftConfig {
                pack_count: req.pack_count,
                pack_size: req.pack_size,
                seat_count: req.seat_count,
                pass_pattern: req.pass_pattern.clone(),
            },
            &req.deck,
        )?;
        let deck_slug = normalize_slug(&req.deck_slug);

        let room_id = {
            let mut rooms = self.write_rooms();
            if rooms
                .values()
                .any(|room| room.owner_device_id() == device_id)
            {
                return Err(Error::OwnerHasRoom);
            }
            let room_id = next_room_id(|candidate| rooms.contains_key(candidate));
            rooms.insert(
                room_id.clone(),
                Arc::new(Room::new(
                    room_id.clone(),
                    deck_slug,
                    device_id.to_string(),
                    draft,
                )),
            );
            room_id
        };

        info!(room_id = %room_id, owner = %device_id, "draft room created");
        self.notify_lobby();
        Ok(room_id)
    }

    /// Delete a room; only the owning device may. The persisted snapshot
    /// goes first so a crash cannot resurrect the room.
    pub fn delete_room(&self, room_id: &str, device_id: &str) -> Result<()> {
        if room_id.is_empty() {
            return Err(Error::RoomIdRequired);
        }

        let removed = {
            let mut rooms = self.write_rooms();
            {
                let room = rooms.get(room_id).ok_or(Error::RoomNotFound)?;
                if room.owner_device_id().is_empty() || room.owner_device_id() != device_id {
                    return Err(Error::Forbidden);
                }
            }
            if let Some(store) = self.store() {
                store.delete_room(room_id).map_err(Error::Draft)?;
            }
            rooms.remove(room_id)
        };

        if let Some(room) = removed {
            room.close_all();
        }
        info!(room_id, "draft room deleted");
        self.notify_lobby();
        Ok(())
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.read_rooms().get(room_id).cloned()
    }

    /// Summaries of every room, sorted by id for stable responses.
    pub fn list_room_summaries(&self, requester_device_id: &str) -> Vec<RoomSummary> {
        let rooms: Vec<Arc<Room>> = self.read_rooms().values().cloned().collect();
        let mut summaries: Vec<RoomSummary> = rooms
            .iter()
            .map(|room| room.summary(requester_device_id))
            .collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    /// Snapshot every live room, sorted by id.
    pub fn snapshot_records(&self) -> Vec<RoomRecord> {
        let rooms: Vec<Arc<Room>> = self.read_rooms().values().cloned().collect();
        let mut records: Vec<RoomRecord> =
            rooms.iter().map(|room| room.snapshot_record()).collect();
        records.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        records
    }

    /// Persist changed rooms. Returns rows written; 0 when no store is
    /// attached.
    pub fn save_to_store(&self) -> Result<usize> {
        let Some(store) = self.store() else {
            return Ok(0);
        };
        let records = self.snapshot_records();
        store.save_rooms(&records).map_err(Error::Draft)
    }

    /// Rebuild rooms from persisted records. Corrupt snapshots are
    /// logged and skipped so one bad row cannot keep the server down.
    pub fn restore_rooms(&self, records: Vec<RoomRecord>) -> usize {
        let mut restored = 0;
        let mut rooms = self.write_rooms();
        for record in records {
            let RoomRecord {
                room_id,
                deck_slug,
                owner_device_id,
                snapshot,
            } = record;
            if room_id.is_empty() {
                warn!("skipping persisted room with empty id");
                continue;
            }
            match Draft::from_snapshot(snapshot) {
                Ok(draft) => {
                    let room = Room::new(
                        room_id.clone(),
                        normalize_slug(&deck_slug),
                        owner_device_id,
                        draft,
                    );
                    rooms.insert(room_id, Arc::new(room));
                    restored += 1;
                }
                Err(err) => {
                    warn!(room_id = %room_id, error = %err, "skipping corrupt room snapshot");
                }
            }
        }
        restored
    }

    /// Register a lobby subscriber. The guard unsubscribes on drop.
    pub fn subscribe_lobby(self: Arc<Self>) -> LobbySubscription {
        let (tx, rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        self.lock_subs().insert(id, tx);
        LobbySubscription { id, rx, hub: self }
    }

    /// Non-blocking signal to every subscriber. A full slot coalesces:
    /// subscribers re-read the whole room list on wakeup, so missed
    /// signals are harmless.
    pub fn notify_lobby(&self) {
        let subs = self.lock_subs();
        for tx in subs.values() {
            let _ = tx.try_send(());
        }
    }

    fn lock_subs(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, mpsc::Sender<()>>> {
        self.lobby_subs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A registered lobby listener. Dropping it removes the subscription.
pub struct LobbySubscription {
    id: Uuid,
    rx: mpsc::Receiver<()>,
    hub: Arc<Hub>,
}

impl LobbySubscription {
    /// Wait for the next change signal. False when the hub is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

impl Drop for LobbySubscription {
    fn drop(&mut self) {
        self.hub.lock_subs().remove(&self.id);
    }
}

/// Lowercase slugs restricted to `[a-z0-9-]`; anything else is dropped.
pub(crate) fn normalize_slug(raw: &str) -> String {
    let slug = raw.trim().to_lowercase();
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return String::new();
    }
    slug
}
