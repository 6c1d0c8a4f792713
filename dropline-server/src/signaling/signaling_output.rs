use async_trait::async_trait;
use dropline_core::{PeerId, ServerMessage};

/// Outbound side of the relay: how the relay actor reaches a connected client.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Deliver a message to one connection. Returns `false` if the peer is gone.
    async fn send(&self, peer_id: PeerId, msg: ServerMessage) -> bool;
}
