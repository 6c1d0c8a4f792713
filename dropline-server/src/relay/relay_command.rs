use dropline_core::{ForwardKind, PeerId, RoomCode};
use serde_json::Value;

/// Commands the websocket tasks send to the relay actor.
#[derive(Debug)]
pub enum RelayCommand {
    /// The room code has already been accepted by the room directory.
    Join {
        peer_id: PeerId,
        room: RoomCode,
        name: Option<String>,
    },

    /// Opaque negotiation payload for another member of the sender's room.
    Forward {
        sender_id: PeerId,
        target_id: PeerId,
        kind: ForwardKind,
        payload: Value,
    },

    /// Member asks for the current snapshot again.
    Presence { peer_id: PeerId },

    /// The websocket of this peer closed.
    Leave { peer_id: PeerId },
}
