//! Error types for draftden core
//!
//! Display strings double as the wire-visible error messages, so they
//! stay short and stable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Draft construction
    #[error("invalid draft config")]
    InvalidConfig,

    #[error("deck too small for requested draft config")]
    DeckTooSmall,

    #[error("invalid pass pattern: {0}")]
    InvalidPassPattern(&'static str),

    // Command validation
    #[error("invalid seat")]
    InvalidSeat,

    #[error("draft already complete")]
    DraftComplete,

    #[error("invalid seq")]
    InvalidSeq,

    #[error("stale seq")]
    StaleSeq,

    #[error("seq gap")]
    SeqGap,

    #[error("seat already picked this round")]
    SeatAlreadyPicked,

    #[error("pack mismatch")]
    PackMismatch,

    #[error("no picks available for current pass")]
    NoPicksThisPass,

    #[error("expected {0} picks for this pass")]
    WrongPickCount(usize),

    #[error("not enough cards in pack for this pass")]
    NotEnoughCards,

    #[error("card name required")]
    CardNameRequired,

    #[error("card not available in pack")]
    CardNotAvailable,

    #[error("invalid pick zone")]
    InvalidZone,

    #[error("card not in source zone")]
    CardNotInZone,

    // Invariant violations surfaced by defensive checks
    #[error("unexpected pack size")]
    PackSizeInvariant,

    // Snapshot restore
    #[error("unsupported snapshot schema version: {0}")]
    SnapshotVersion(u32),

    #[error("corrupt snapshot: {0}")]
    SnapshotCorrupt(String),

    // Store
    #[error("room id required")]
    RoomIdRequired,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
