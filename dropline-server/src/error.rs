use dropline_core::{PeerId, RoomCode, RoomCodeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("room not found: {0}")]
    RoomNotFound(RoomCode),

    #[error("invalid room code: {0}")]
    InvalidRoomCode(#[from] RoomCodeError),

    #[error("relay is shut down")]
    RelayClosed,
}

/// Why a forward could not be delivered. Logged and dropped, never reported to the sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingMiss {
    #[error("sender {0} has not joined a room")]
    SenderNotJoined(PeerId),

    #[error("target {target} is not a member of room {room}")]
    TargetAbsent { target: PeerId, room: RoomCode },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address '{value}': {source}")]
    InvalidBind {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("unknown room policy '{0}', expected 'open' or 'registered'")]
    UnknownRoomPolicy(String),
}
