use async_trait::async_trait;
use dropline_core::{PeerId, ServerMessage};
use dropline_server::SignalingOutput;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Message captured on its way to one peer.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub peer_id: PeerId,
    pub msg: ServerMessage,
}

/// Mock SignalingOutput that captures all outgoing relay messages.
#[derive(Clone)]
pub struct MockSignalingOutput {
    /// Channel to send captured messages.
    tx: mpsc::UnboundedSender<Delivered>,
    /// All captured messages (for verification).
    delivered: Arc<Mutex<Vec<Delivered>>>,
    /// Peers treated as disconnected.
    gone: Arc<Mutex<HashSet<PeerId>>>,
}

impl MockSignalingOutput {
    /// Create a new MockSignalingOutput and its receiver channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivered>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let signaling = Self {
            tx,
            delivered: Arc::new(Mutex::new(Vec::new())),
            gone: Arc::new(Mutex::new(HashSet::new())),
        };
        (signaling, rx)
    }

    /// Make every later delivery to `peer_id` fail.
    pub async fn disconnect(&self, peer_id: PeerId) {
        self.gone.lock().await.insert(peer_id);
    }

    /// All messages delivered to a specific peer, in order.
    pub async fn messages_for(&self, peer_id: &PeerId) -> Vec<ServerMessage> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|d| &d.peer_id == peer_id)
            .map(|d| d.msg.clone())
            .collect()
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn send(&self, peer_id: PeerId, msg: ServerMessage) -> bool {
        if self.gone.lock().await.contains(&peer_id) {
            tracing::debug!("[MockSignaling] {:?} is gone", peer_id);
            return false;
        }

        tracing::debug!("[MockSignaling] send to {:?}: {:?}", peer_id, msg);
        let delivered = Delivered { peer_id, msg };
        self.delivered.lock().await.push(delivered.clone());
        let _ = self.tx.send(delivered);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_signaling_captures_messages() {
        let (signaling, mut rx) = MockSignalingOutput::new();
        let peer_id = PeerId::new();

        assert!(
            signaling
                .send(peer_id, ServerMessage::PeerLeft { peer_id })
                .await
        );

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.peer_id, peer_id);
        assert_eq!(signaling.messages_for(&peer_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_signaling_drops_for_disconnected_peer() {
        let (signaling, _rx) = MockSignalingOutput::new();
        let peer_id = PeerId::new();
        signaling.disconnect(peer_id).await;

        assert!(
            !signaling
                .send(peer_id, ServerMessage::PeerLeft { peer_id })
                .await
        );
        assert!(signaling.messages_for(&peer_id).await.is_empty());
    }
}
