//! The authoritative draft state machine and its snapshot codec.

mod config;
mod engine;
mod snapshot;

pub use config::{normalize_pass_pattern, DraftConfig};
pub use engine::{
    CommandResult, Draft, DraftPhase, DraftProgress, Event, Pack, PackView, PickSelection,
    PickZone, PlayerState, SeatPicks, SeatState,
};
pub use snapshot::{DraftSnapshot, PackSnapshot, SNAPSHOT_SCHEMA_VERSION};
