use crate::model::peer::{MemberInfo, PeerId};
use crate::model::room::RoomCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Which negotiation step a forwarded payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardKind {
    Offer,
    Answer,
    Candidate,
}

/// Client → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    content = "d",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    Join {
        room: String,
        #[serde(default)]
        name: Option<String>,
    },
    Forward {
        target_id: PeerId,
        kind: ForwardKind,
        payload: Value,
    },
    /// Re-request the current member snapshot.
    Presence,
}

/// Relay → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    content = "d",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Welcome {
        peer_id: PeerId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    Joined {
        peer_id: PeerId,
        room: RoomCode,
    },
    Presence {
        members: Vec<MemberInfo>,
    },
    PeerJoined {
        peer_id: PeerId,
        name: Option<String>,
    },
    PeerLeft {
        peer_id: PeerId,
    },
    Forward {
        sender_id: PeerId,
        kind: ForwardKind,
        payload: Value,
    },
    Error {
        message: String,
    },
}
