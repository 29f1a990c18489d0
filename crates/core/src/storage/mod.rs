//! SQLite-backed persistence for draft rooms.
//!
//! One row per room keyed on `room_id`, with the room's `global_seq`
//! denormalized into its own column so a save pass can skip rooms that
//! have not advanced since the last write. A single connection behind a
//! mutex serializes all access.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::draft::DraftSnapshot;
use crate::error::{Error, Result};

/// A persisted room: identity plus the full draft snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomRecord {
    pub room_id: String,
    pub deck_slug: String,
    pub owner_device_id: String,
    pub snapshot: DraftSnapshot,
}

/// Room store with one guarded connection (WAL, 5 s busy timeout).
pub struct RoomStore {
    conn: Mutex<Connection>,
}

impl RoomStore {
    /// Open or create the store at the given path, creating parent
    /// directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        init_schema(&conn)?;
        Ok(RoomStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist every record whose `global_seq` differs from the stored
    /// row, all in one transaction. Returns how many rows were written.
    #[instrument(skip_all)]
    pub fn save_rooms(&self, records: &[RoomRecord]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut select =
                tx.prepare("SELECT global_seq FROM draft_rooms WHERE room_id = ?1")?;
            let mut upsert = tx.prepare(
                "INSERT INTO draft_rooms (room_id, deck_slug, owner_device_id, global_seq, snapshot_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(room_id) DO UPDATE SET
                   deck_slug = excluded.deck_slug,
                   owner_device_id = excluded.owner_device_id,
                   global_seq = excluded.global_seq,
                   snapshot_json = excluded.snapshot_json,
                   updated_at = CURRENT_TIMESTAMP",
            )?;

            for record in records {
                if record.room_id.is_empty() {
                    continue;
                }

                let existing: Option<u64> = select
                    .query_row(params![record.room_id], |row| row.get(0))
                    .optional()?;
                if existing == Some(record.snapshot.global_seq) {
                    continue;
                }

                let owner_device_id = if record.owner_device_id.is_empty() {
                    record.snapshot.owner_device_id.as_str()
                } else {
                    record.owner_device_id.as_str()
                };
                let raw = serde_json::to_string(&record.snapshot)?;
                upsert.execute(params![
                    record.room_id,
                    record.deck_slug,
                    owner_device_id,
                    record.snapshot.global_seq,
                    raw,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;

        debug!(rooms = records.len(), written, "room save pass complete");
        Ok(written)
    }

    /// Load every persisted room, ordered by room id.
    pub fn load_rooms(&self) -> Result<Vec<RoomRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT room_id, deck_slug, owner_device_id, global_seq, snapshot_json
             FROM draft_rooms ORDER BY room_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (room_id, deck_slug, mut owner_device_id, global_seq, raw) = row?;
            let mut snapshot: DraftSnapshot = serde_json::from_str(&raw)?;
            // The column is authoritative for change detection; older
            // rows may only carry the owner inside the blob.
            snapshot.global_seq = global_seq;
            if owner_device_id.is_empty() {
                owner_device_id = snapshot.owner_device_id.clone();
            }
            snapshot.owner_device_id = owner_device_id.clone();
            records.push(RoomRecord {
                room_id,
                deck_slug,
                owner_device_id,
                snapshot,
            });
        }
        Ok(records)
    }

    /// Remove a room's row. Deleting an absent room is not an error.
    pub fn delete_room(&self, room_id: &str) -> Result<()> {
        if room_id.is_empty() {
            return Err(Error::RoomIdRequired);
        }
        let conn = self.lock();
        conn.execute("DELETE FROM draft_rooms WHERE room_id = ?1", params![room_id])?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS draft_rooms (
            room_id TEXT PRIMARY KEY,
            deck_slug TEXT NOT NULL DEFAULT '',
            owner_device_id TEXT NOT NULL DEFAULT '',
            global_seq INTEGER NOT NULL DEFAULT 0,
            snapshot_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS draft_rooms_updated_at_idx ON draft_rooms(updated_at);",
    )?;
    ensure_column(conn, "owner_device_id", "TEXT NOT NULL DEFAULT ''")?;
    Ok(())
}

/// Additive schema evolution: probe-and-add so databases created before
/// a column existed pick it up on open.
fn ensure_column(conn: &Connection, name: &str, decl: &str) -> Result<()> {
    match conn.execute(&format!("ALTER TABLE draft_rooms ADD COLUMN {name} {decl}"), []) {
        Ok(_) => Ok(()),
        Err(err) if err.to_string().to_lowercase().contains("duplicate column name") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::{Draft, DraftConfig};

    fn make_draft() -> Draft {
        let deck: Vec<String> = (0..4).map(|i| format!("C{i:03}")).collect();
        Draft::new(
            DraftConfig {
                pack_count: 1,
                pack_size: 2,
                seat_count: 2,
                pass_pattern: Vec::new(),
            },
            &deck,
        )
        .expect("draft construction")
    }

    fn record(room_id: &str, draft: &Draft) -> RoomRecord {
        RoomRecord {
            room_id: room_id.to_string(),
            deck_slug: "tempo".to_string(),
            owner_device_id: "device-a".to_string(),
            snapshot: draft.to_snapshot(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = RoomStore::open_in_memory().expect("open store");
        let draft = make_draft();

        let written = store
            .save_rooms(&[record("plucky-rabbit", &draft)])
            .expect("save");
        assert_eq!(written, 1);

        let records = store.load_rooms().expect("load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].room_id, "plucky-rabbit");
        assert_eq!(records[0].deck_slug, "tempo");
        assert_eq!(records[0].owner_device_id, "device-a");

        let mut expected = draft.to_snapshot();
        expected.owner_device_id = "device-a".to_string();
        assert_eq!(records[0].snapshot, expected);
    }

    #[test]
    fn unchanged_rooms_are_skipped() {
        let store = RoomStore::open_in_memory().expect("open store");
        let mut draft = make_draft();

        assert_eq!(store.save_rooms(&[record("r", &draft)]).expect("save"), 1);
        // Nothing advanced; the second pass writes nothing.
        assert_eq!(store.save_rooms(&[record("r", &draft)]).expect("save"), 0);

        let state = draft.player_state(0).expect("player state");
        let pack = state.active_pack.expect("active pack");
        draft
            .pick(0, 1, &pack.pack_id, &pack.cards[0], "mainboard")
            .expect("pick");
        assert_eq!(store.save_rooms(&[record("r", &draft)]).expect("save"), 1);
    }

    #[test]
    fn empty_room_ids_are_ignored() {
        let store = RoomStore::open_in_memory().expect("open store");
        let draft = make_draft();
        let written = store.save_rooms(&[record("", &draft)]).expect("save");
        assert_eq!(written, 0);
        assert!(store.load_rooms().expect("load").is_empty());
    }

    #[test]
    fn delete_removes_row() {
        let store = RoomStore::open_in_memory().expect("open store");
        let draft = make_draft();
        store.save_rooms(&[record("r", &draft)]).expect("save");

        store.delete_room("r").expect("delete");
        assert!(store.load_rooms().expect("load").is_empty());

        // Deleting again is a no-op, not an error.
        store.delete_room("r").expect("repeat delete");
        assert!(matches!(store.delete_room(""), Err(Error::RoomIdRequired)));
    }

    #[test]
    fn restored_snapshot_round_trips_through_store() {
        let store = RoomStore::open_in_memory().expect("open store");
        let mut draft = make_draft();
        let state = draft.player_state(0).expect("player state");
        let pack = state.active_pack.expect("active pack");
        draft
            .pick(0, 1, &pack.pack_id, &pack.cards[0], "mainboard")
            .expect("pick");

        store.save_rooms(&[record("r", &draft)]).expect("save");
        let records = store.load_rooms().expect("load");
        let restored = Draft::from_snapshot(records[0].snapshot.clone()).expect("restore");

        let mut expected = draft.to_snapshot();
        expected.owner_device_id = "device-a".to_string();
        let mut actual = restored.to_snapshot();
        actual.owner_device_id = records[0].owner_device_id.clone();
        assert_eq!(actual, expected);
    }

    #[test]
    fn schema_init_is_idempotent_on_reopen() {
        let path = std::env::temp_dir().join(format!(
            "draftden-store-{}.sqlite",
            uuid::Uuid::new_v4()
        ));
        {
            let store = RoomStore::open(&path).expect("first open");
            let draft = make_draft();
            store.save_rooms(&[record("r", &draft)]).expect("save");
        }
        {
            let store = RoomStore::open(&path).expect("reopen");
            assert_eq!(store.load_rooms().expect("load").len(), 1);
        }
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }
}
