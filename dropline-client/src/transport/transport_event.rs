use crate::transport::DataChannel;
use dropline_core::{IceCandidate, PeerId, WireMessage};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub enum TransportEvent {
    ChannelOpen(Arc<dyn DataChannel>),
    Disconnected,
    Message(WireMessage),
    CandidateGenerated(IceCandidate),
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelOpen(_) => f.write_str("ChannelOpen"),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Message(msg) => write!(f, "Message({} bytes)", msg.len()),
            Self::CandidateGenerated(c) => write!(f, "CandidateGenerated({})", c.candidate),
        }
    }
}

/// A transport event stamped with the session it came from. The epoch lets the
/// orchestrator ignore late events from a transport it already replaced.
#[derive(Debug)]
pub struct SessionEvent {
    pub peer_id: PeerId,
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Handed to every transport at creation; the only way transports talk back.
#[derive(Clone)]
pub struct EventSink {
    peer_id: PeerId,
    epoch: u64,
    tx: mpsc::Sender<SessionEvent>,
}

impl EventSink {
    pub fn new(peer_id: PeerId, epoch: u64, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { peer_id, epoch, tx }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub async fn emit(&self, event: TransportEvent) {
        let event = SessionEvent {
            peer_id: self.peer_id,
            epoch: self.epoch,
            event,
        };
        if self.tx.send(event).await.is_err() {
            debug!("Orchestrator gone, dropping transport event for {}", self.peer_id);
        }
    }
}
