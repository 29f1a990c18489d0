//! draftden core library
//!
//! The authoritative booster-draft state machine, the versioned snapshot
//! codec, and the SQLite-backed room store. Everything in this crate is
//! synchronous; the network layer owns the locking and the runtime.

pub mod draft;
pub mod error;
pub mod storage;

pub use draft::{Draft, DraftConfig};
pub use error::{Error, Result};
pub use storage::{RoomRecord, RoomStore};
