use crate::session::{NegotiationEvent, NegotiationState};
use crate::transfer::{FileReceiver, OutgoingFile, TransferControl, TransferId};
use crate::transport::{DataChannel, NegotiationTransport};
use dropline_core::{IceCandidate, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

pub struct TransferHandle {
    pub control: TransferControl,
    pub task: JoinHandle<()>,
}

/// Everything the client knows about its link to one remote peer.
pub struct ConnectionSession {
    remote: PeerId,
    role: Role,
    epoch: u64,
    state: NegotiationState,
    transport: Arc<dyn NegotiationTransport>,
    channel: Option<Arc<dyn DataChannel>>,
    pending_candidates: Vec<IceCandidate>,
    started_at: Instant,
    transfers: HashMap<TransferId, TransferHandle>,
    queued: Vec<OutgoingFile>,
    /// Resolves when the most recently started outgoing transfer ends.
    send_chain: Option<oneshot::Receiver<()>>,
    receiver: FileReceiver,
}

impl ConnectionSession {
    pub fn new(
        remote: PeerId,
        role: Role,
        epoch: u64,
        transport: Arc<dyn NegotiationTransport>,
        now: Instant,
    ) -> Self {
        Self {
            remote,
            role,
            epoch,
            state: NegotiationState::Idle,
            transport,
            channel: None,
            pending_candidates: Vec::new(),
            started_at: now,
            transfers: HashMap::new(),
            queued: Vec::new(),
            send_chain: None,
            receiver: FileReceiver::new(),
        }
    }

    pub fn remote(&self) -> PeerId {
        self.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn transport(&self) -> Arc<dyn NegotiationTransport> {
        self.transport.clone()
    }

    /// Applies `event`; invalid transitions are logged and leave the state alone.
    pub fn apply(&mut self, event: NegotiationEvent) -> bool {
        match self.state.next(&event) {
            Some(next) => {
                debug!(
                    "Session {} ({:?}): {:?} -> {:?}",
                    self.remote, self.role, self.state, next
                );
                self.state = next;
                true
            }
            None => {
                warn!(
                    "Session {} ignored {:?} in state {:?}",
                    self.remote, event, self.state
                );
                false
            }
        }
    }

    pub fn is_stalled(&self, now: Instant, timeout: Duration) -> bool {
        self.state.is_live()
            && self.state != NegotiationState::Open
            && now.saturating_duration_since(self.started_at) >= timeout
    }

    pub fn buffer_candidate(&mut self, candidate: IceCandidate) {
        self.pending_candidates.push(candidate);
    }

    pub fn take_pending_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn channel(&self) -> Option<Arc<dyn DataChannel>> {
        self.channel.clone()
    }

    pub fn set_channel(&mut self, channel: Arc<dyn DataChannel>) {
        self.channel = Some(channel);
    }

    pub fn take_channel(&mut self) -> Option<Arc<dyn DataChannel>> {
        self.channel.take()
    }

    pub fn queue(&mut self, file: OutgoingFile) {
        self.queued.push(file);
    }

    pub fn take_queued(&mut self) -> Vec<OutgoingFile> {
        std::mem::take(&mut self.queued)
    }

    /// Appends a transfer to the send chain; returns what it must wait for so
    /// frames of two transfers never interleave on the channel.
    pub fn chain_send(&mut self, done: oneshot::Receiver<()>) -> Option<oneshot::Receiver<()>> {
        self.send_chain.replace(done)
    }

    pub fn track_transfer(&mut self, id: TransferId, handle: TransferHandle) {
        self.transfers.insert(id, handle);
    }

    pub fn take_transfers(&mut self) -> Vec<(TransferId, TransferHandle)> {
        self.transfers.drain().collect()
    }

    pub fn prune_finished_transfers(&mut self) {
        self.transfers.retain(|_, handle| !handle.task.is_finished());
    }

    pub fn active_transfers(&self) -> usize {
        self.transfers.len()
    }

    pub fn receiver_mut(&mut self) -> &mut FileReceiver {
        &mut self.receiver
    }
}
