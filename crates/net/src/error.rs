//! Admission and transport error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use draftden_core::Error as CoreError;

/// Transport result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced on the HTTP side of the draft API
#[derive(Debug, Error)]
pub enum Error {
    #[error("valid device_id required")]
    InvalidDeviceId,

    #[error("room_id query param required")]
    RoomIdRequired,

    #[error("room not found")]
    RoomNotFound,

    #[error("only the creator may delete this room")]
    Forbidden,

    #[error("only one room per device is allowed")]
    OwnerHasRoom,

    #[error("invalid json body")]
    InvalidBody,

    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Draft(#[from] CoreError),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidDeviceId
            | Error::RoomIdRequired
            | Error::InvalidBody
            | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::RoomNotFound => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::OwnerHasRoom => StatusCode::CONFLICT,
            // Store trouble is the server's fault; everything else the
            // engine rejects is a client input problem.
            Error::Draft(CoreError::Database(_))
            | Error::Draft(CoreError::Serialization(_))
            | Error::Draft(CoreError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Draft(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
