//! Snapshot codec: drafts to and from a versioned value record.
//!
//! The snapshot is the unit of persistence. Restoring re-validates every
//! structural invariant so a corrupt row cannot smuggle an impossible
//! draft back into memory.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::config::{normalize_pass_pattern, DraftConfig};
use super::engine::{Draft, DraftProgress, Pack, SeatState};

/// Bumped whenever the snapshot layout changes incompatibly. Readers
/// reject anything else.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSnapshot {
    pub id: String,
    pub cards: Vec<String>,
    pub picked: Vec<bool>,
}

/// The full persisted form of one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner_device_id: String,
    pub config: DraftConfig,
    pub packs: Vec<Vec<PackSnapshot>>,
    pub progress: DraftProgress,
    pub seats: Vec<SeatState>,
    pub seat_picked: Vec<bool>,
    pub last_seq_by_seat: Vec<u64>,
    pub global_seq: u64,
}

impl Draft {
    /// Materialize a deep-copied snapshot with the schema version
    /// stamped in.
    pub fn to_snapshot(&self) -> DraftSnapshot {
        let packs = self
            .packs
            .iter()
            .map(|row| {
                row.iter()
                    .map(|pack| PackSnapshot {
                        id: pack.id.clone(),
                        cards: pack.cards.clone(),
                        picked: pack.picked.clone(),
                    })
                    .collect()
            })
            .collect();

        DraftSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            owner_device_id: String::new(),
            config: self.config.clone(),
            packs,
            progress: self.progress,
            seats: self.seats.clone(),
            seat_picked: self.seat_picked.clone(),
            last_seq_by_seat: self.last_seq_by_seat.clone(),
            global_seq: self.global_seq,
        }
    }

    /// Rebuild a draft from a snapshot, re-validating every invariant.
    pub fn from_snapshot(snapshot: DraftSnapshot) -> Result<Draft> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(Error::SnapshotVersion(snapshot.schema_version));
        }

        let mut config = snapshot.config;
        if config.pack_count == 0 || config.pack_size == 0 || config.seat_count == 0 {
            return Err(Error::SnapshotCorrupt("invalid draft config".into()));
        }
        // A pattern that no longer normalizes is corruption, not input error.
        config.pass_pattern = normalize_pass_pattern(config.pack_size, &config.pass_pattern)
            .map_err(|err| Error::SnapshotCorrupt(err.to_string()))?;

        if snapshot.packs.len() != config.pack_count {
            return Err(Error::SnapshotCorrupt(format!(
                "pack count mismatch: got {} want {}",
                snapshot.packs.len(),
                config.pack_count
            )));
        }
        let mut packs = Vec::with_capacity(config.pack_count);
        for (pack_no, row) in snapshot.packs.into_iter().enumerate() {
            if row.len() != config.seat_count {
                return Err(Error::SnapshotCorrupt(format!(
                    "seat count mismatch in pack row {pack_no}: got {} want {}",
                    row.len(),
                    config.seat_count
                )));
            }
            let mut pack_row = Vec::with_capacity(config.seat_count);
            for (seat, pack) in row.into_iter().enumerate() {
                if pack.cards.len() != config.pack_size || pack.picked.len() != config.pack_size {
                    return Err(Error::SnapshotCorrupt(format!(
                        "pack size mismatch at pack row {pack_no} seat {seat}"
                    )));
                }
                pack_row.push(Pack {
                    id: pack.id,
                    cards: pack.cards,
                    picked: pack.picked,
                });
            }
            packs.push(pack_row);
        }

        if snapshot.seats.len() != config.seat_count {
            return Err(Error::SnapshotCorrupt(format!(
                "seat state count mismatch: got {} want {}",
                snapshot.seats.len(),
                config.seat_count
            )));
        }

        let mut progress = snapshot.progress;
        if progress.pack_number > config.pack_count {
            return Err(Error::SnapshotCorrupt(format!(
                "pack number out of range: {}",
                progress.pack_number
            )));
        }
        if progress.pack_number < config.pack_count
            && progress.pick_number >= config.pass_pattern.len()
        {
            return Err(Error::SnapshotCorrupt(format!(
                "pick number out of range: {}",
                progress.pick_number
            )));
        }

        if snapshot.seat_picked.len() != config.seat_count {
            return Err(Error::SnapshotCorrupt(format!(
                "seat picked count mismatch: got {} want {}",
                snapshot.seat_picked.len(),
                config.seat_count
            )));
        }
        if snapshot.last_seq_by_seat.len() != config.seat_count {
            return Err(Error::SnapshotCorrupt(format!(
                "last seq count mismatch: got {} want {}",
                snapshot.last_seq_by_seat.len(),
                config.seat_count
            )));
        }

        let mut seat_picked = snapshot.seat_picked;
        if progress.pack_number >= config.pack_count {
            // A finished draft holds no latches and no pass position.
            progress.pick_number = 0;
            seat_picked.fill(false);
        }

        Ok(Draft {
            config,
            packs,
            progress,
            seats: snapshot.seats,
            seat_picked,
            last_seq_by_seat: snapshot.last_seq_by_seat,
            global_seq: snapshot.global_seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_draft(pack_count: usize, pack_size: usize, seat_count: usize) -> Draft {
        let deck: Vec<String> = (0..pack_count * pack_size * seat_count)
            .map(|i| format!("C{i:03}"))
            .collect();
        Draft::new(
            DraftConfig {
                pack_count,
                pack_size,
                seat_count,
                pass_pattern: Vec::new(),
            },
            &deck,
        )
        .expect("draft construction")
    }

    fn pick_first(draft: &mut Draft, seat: usize, seq: u64) {
        let state = draft.player_state(seat).expect("player state");
        let pack = state.active_pack.expect("active pack");
        draft
            .pick(seat, seq, &pack.pack_id, &pack.cards[0], "mainboard")
            .expect("pick");
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let mut draft = make_draft(1, 2, 2);
        pick_first(&mut draft, 0, 1);

        let snapshot = draft.to_snapshot();
        let restored = Draft::from_snapshot(snapshot.clone()).expect("restore");
        let second = restored.to_snapshot();

        assert_eq!(second, snapshot);
        let left = serde_json::to_string(&snapshot).expect("encode");
        let right = serde_json::to_string(&second).expect("encode");
        assert_eq!(left, right);
    }

    #[test]
    fn unknown_schema_version_rejected() {
        let draft = make_draft(1, 2, 2);
        let mut snapshot = draft.to_snapshot();
        snapshot.schema_version = 1;
        assert!(matches!(
            Draft::from_snapshot(snapshot),
            Err(Error::SnapshotVersion(1))
        ));
    }

    #[test]
    fn size_mismatches_rejected() {
        let draft = make_draft(2, 2, 2);

        let mut truncated_row = draft.to_snapshot();
        truncated_row.packs[0].pop();
        assert!(matches!(
            Draft::from_snapshot(truncated_row),
            Err(Error::SnapshotCorrupt(_))
        ));

        let mut short_pack = draft.to_snapshot();
        short_pack.packs[0][0].cards.pop();
        assert!(matches!(
            Draft::from_snapshot(short_pack),
            Err(Error::SnapshotCorrupt(_))
        ));

        let mut missing_seat = draft.to_snapshot();
        missing_seat.seats.pop();
        assert!(matches!(
            Draft::from_snapshot(missing_seat),
            Err(Error::SnapshotCorrupt(_))
        ));

        let mut missing_latch = draft.to_snapshot();
        missing_latch.seat_picked.pop();
        assert!(matches!(
            Draft::from_snapshot(missing_latch),
            Err(Error::SnapshotCorrupt(_))
        ));
    }

    #[test]
    fn corrupt_pass_pattern_rejected() {
        let draft = make_draft(1, 2, 2);
        let mut snapshot = draft.to_snapshot();
        snapshot.config.pass_pattern = vec![99];
        assert!(matches!(
            Draft::from_snapshot(snapshot),
            Err(Error::SnapshotCorrupt(_))
        ));
    }

    #[test]
    fn out_of_range_progress_rejected() {
        let draft = make_draft(1, 2, 2);

        let mut bad_pack = draft.to_snapshot();
        bad_pack.progress.pack_number = 5;
        assert!(matches!(
            Draft::from_snapshot(bad_pack),
            Err(Error::SnapshotCorrupt(_))
        ));

        let mut bad_pick = draft.to_snapshot();
        bad_pick.progress.pick_number = 7;
        assert!(matches!(
            Draft::from_snapshot(bad_pick),
            Err(Error::SnapshotCorrupt(_))
        ));
    }

    #[test]
    fn finished_draft_restores_with_cleared_latches() {
        let draft = make_draft(1, 2, 2);
        let mut snapshot = draft.to_snapshot();
        snapshot.progress.pack_number = snapshot.config.pack_count;
        snapshot.progress.pick_number = 1;
        snapshot.seat_picked = vec![true, true];

        let restored = Draft::from_snapshot(snapshot).expect("restore finished draft");
        assert_eq!(restored.progress.pick_number, 0);
        assert!(restored.seat_picked.iter().all(|&picked| !picked));
    }

    #[test]
    fn basics_survive_the_round_trip() {
        let mut draft = make_draft(1, 2, 2);
        let mut basics = std::collections::BTreeMap::new();
        basics.insert("Plains".to_string(), 7u32);
        draft.set_basics(0, 1, basics.clone()).expect("set basics");

        let restored = Draft::from_snapshot(draft.to_snapshot()).expect("restore");
        assert_eq!(restored.seats[0].basics, basics);
        assert_eq!(restored.global_seq, draft.global_seq);
    }
}
