mod delivery;
mod frame;
mod negotiation;
mod peer;
mod room;
mod signaling;

pub use delivery::Delivery;
pub use frame::{ControlFrame, FileMetadata, FrameError, WireMessage};
pub use negotiation::{IceCandidate, SdpKind, SessionDescription};
pub use peer::{MemberInfo, PeerId, PeerIdError, display_name};
pub use room::{RoomCode, RoomCodeError};
pub use signaling::{ClientMessage, ForwardKind, IceServerConfig, ServerMessage};
