use crate::error::TransportError;
use crate::transport::{EventSink, TransportConfig};
use async_trait::async_trait;
use dropline_core::{IceCandidate, PeerId, SessionDescription, WireMessage};
use std::sync::Arc;
use std::time::Duration;

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// The negotiated direct channel file frames travel over.
#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send(&self, msg: WireMessage) -> Result<(), TransportError>;

    /// Bytes queued locally and not yet handed to the network.
    async fn buffered_amount(&self) -> usize;

    fn is_open(&self) -> bool;

    async fn close(&self);

    /// Resolves once at most `watermark` bytes are buffered.
    async fn wait_below(&self, watermark: usize) -> Result<(), TransportError> {
        while self.buffered_amount().await > watermark {
            if !self.is_open() {
                return Err(TransportError::ChannelClosed);
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        Ok(())
    }
}

/// One peer connection. Opened channels, local candidates and disconnects are
/// reported through the [`EventSink`] the transport was created with.
#[async_trait]
pub trait NegotiationTransport: Send + Sync {
    /// Creates the outbound channel and returns the local offer.
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// Applies a remote offer and returns the local answer.
    async fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError>;

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), TransportError>;

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn close(&self);
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        remote: PeerId,
        config: TransportConfig,
        events: EventSink,
    ) -> Result<Arc<dyn NegotiationTransport>, TransportError>;
}
