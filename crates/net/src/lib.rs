//! draftden network library
//!
//! Rooms, the hub that owns them, the JSON wire protocol, and the axum
//! transport surface (REST + SSE lobby + WebSocket seat channels).
//!
//! # Architecture
//!
//! - **Room**: wraps one draft and its seat connections behind a mutex
//! - **Hub**: the room registry; admission, lobby push, persistence glue
//! - **Transport**: stateless handlers that route into the hub
//!
//! The draft itself lives in `draftden-core` and is never touched
//! outside a room's lock.

pub mod error;
pub mod http;
pub mod hub;
pub mod protocol;
pub mod room;
mod room_id;
mod ws;

pub use error::{Error, Result};
pub use hub::Hub;
pub use room::Room;
