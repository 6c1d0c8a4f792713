use crate::config::ClientConfig;
use crate::error::{TransferError, TransportError};
use crate::relay_client::RelayLink;
use crate::session::{
    CloseReason, ConnectionSession, NegotiationEvent, NegotiationState, Role, TransferHandle,
};
use crate::transfer::{
    Direction, FileSender, OutgoingFile, ReceiveOutcome, ReceivedFile, TransferControl,
    TransferId,
};
use crate::transport::{
    DataChannel, EventSink, NegotiationTransport, SessionEvent, TransportConfig, TransportEvent,
    TransportFactory,
};
use dropline_core::{
    ClientMessage, Delivery, FileMetadata, ForwardKind, IceCandidate, IceServerConfig,
    MemberInfo, PeerId, RoomCode, ServerMessage, SessionDescription,
};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tracing::{debug, error, info, warn};

const TRANSPORT_EVENT_BUFFER: usize = 256;
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ClientCommand {
    Join { room: String, name: Option<String> },
    RequestPresence,
    Connect(PeerId),
    SendFile { peer_id: PeerId, file: OutgoingFile },
    Close(PeerId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Welcome {
        peer_id: PeerId,
    },
    Joined {
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
    PeerConnected {
        peer_id: PeerId,
    },
    PeerDisconnected {
        peer_id: PeerId,
        reason: CloseReason,
    },
    TransferStarted {
        peer_id: PeerId,
        transfer_id: TransferId,
        direction: Direction,
        metadata: FileMetadata,
    },
    TransferProgress {
        peer_id: PeerId,
        transfer_id: TransferId,
        bytes: u64,
    },
    TransferCompleted {
        peer_id: PeerId,
        transfer_id: TransferId,
        direction: Direction,
        bytes: u64,
    },
    TransferAborted {
        peer_id: PeerId,
        transfer_id: TransferId,
        direction: Direction,
        reason: String,
    },
    FileReceived {
        peer_id: PeerId,
        transfer_id: TransferId,
        file: ReceivedFile,
    },
    RelayError {
        message: String,
    },
}

/// Owns every connection session of one client. Relay messages, transport events
/// and application commands are handled one at a time on a single task.
pub struct PeerOrchestrator {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    local_id: Option<PeerId>,
    ice_servers: Vec<IceServerConfig>,
    relay_tx: mpsc::UnboundedSender<ClientMessage>,
    relay_rx: mpsc::UnboundedReceiver<ServerMessage>,
    command_rx: mpsc::Receiver<ClientCommand>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
    transport_tx: mpsc::Sender<SessionEvent>,
    transport_rx: mpsc::Receiver<SessionEvent>,
    sessions: HashMap<PeerId, ConnectionSession>,
    /// Candidates from peers we have no session with yet.
    parked: HashMap<PeerId, Vec<IceCandidate>>,
    /// Channel and transport closes running off this task.
    teardowns: Vec<JoinHandle<()>>,
    next_epoch: u64,
}

impl PeerOrchestrator {
    pub fn new(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
        relay: RelayLink,
        command_rx: mpsc::Receiver<ClientCommand>,
        event_tx: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_EVENT_BUFFER);
        Self {
            config,
            factory,
            local_id: None,
            ice_servers: TransportConfig::default().ice_servers,
            relay_tx: relay.outgoing,
            relay_rx: relay.incoming,
            command_rx,
            event_tx,
            transport_tx,
            transport_rx,
            sessions: HashMap::new(),
            parked: HashMap::new(),
            teardowns: Vec::new(),
            next_epoch: 0,
        }
    }

    pub async fn run(mut self) {
        info!("Orchestrator loop started");
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.relay_rx.recv() => match msg {
                    Some(msg) => self.handle_relay(msg).await,
                    None => {
                        info!("Relay link closed");
                        break;
                    }
                },
                Some(event) = self.transport_rx.recv() => self.handle_transport(event).await,
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        info!("Command channel closed");
                        break;
                    }
                },
                _ = sweep.tick() => self.expire_stalled(Instant::now()).await,
            }
        }

        let peers: Vec<PeerId> = self.sessions.keys().copied().collect();
        for peer_id in peers {
            self.close_session(peer_id, CloseReason::Shutdown).await;
        }

        // Nobody drains transport events any more; fail their sends instead of blocking.
        self.transport_rx.close();
        let teardowns = std::mem::take(&mut self.teardowns);
        if timeout(TEARDOWN_GRACE, join_all(teardowns)).await.is_err() {
            warn!("Transport teardown did not finish within {:?}", TEARDOWN_GRACE);
        }
        info!("Orchestrator loop stopped");
    }

    async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Join { room, name } => {
                self.send_relay(ClientMessage::Join { room, name });
            }
            ClientCommand::RequestPresence => self.send_relay(ClientMessage::Presence),
            ClientCommand::Connect(peer_id) => self.initiate(peer_id).await,
            ClientCommand::SendFile { peer_id, file } => self.send_file(peer_id, file).await,
            ClientCommand::Close(peer_id) => {
                self.close_session(peer_id, CloseReason::Local).await;
            }
        }
    }

    async fn handle_relay(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { peer_id } => {
                info!("Relay assigned identity {}", peer_id);
                self.local_id = Some(peer_id);
                self.emit(ClientEvent::Welcome { peer_id });
            }
            ServerMessage::IceConfig { ice_servers } => {
                debug!("Relay announced {} ICE servers", ice_servers.len());
                self.ice_servers = ice_servers;
            }
            ServerMessage::Joined { room, .. } => {
                info!("Joined room '{}'", room);
                self.emit(ClientEvent::Joined { room });
            }
            ServerMessage::Presence { members } => {
                self.emit(ClientEvent::Presence { members });
            }
            ServerMessage::PeerJoined { peer_id, name } => {
                info!("Peer {} joined", peer_id);
                self.emit(ClientEvent::PeerJoined { peer_id, name });
            }
            ServerMessage::PeerLeft { peer_id } => {
                info!("Peer {} left", peer_id);
                self.parked.remove(&peer_id);
                self.close_session(peer_id, CloseReason::PeerLeft).await;
                self.emit(ClientEvent::PeerLeft { peer_id });
            }
            ServerMessage::Forward {
                sender_id,
                kind,
                payload,
            } => self.handle_forward(sender_id, kind, payload).await,
            ServerMessage::Error { message } => {
                warn!("Relay error: {}", message);
                self.emit(ClientEvent::RelayError { message });
            }
        }
    }

    async fn handle_forward(&mut self, from: PeerId, kind: ForwardKind, payload: Value) {
        match kind {
            ForwardKind::Offer => match serde_json::from_value::<SessionDescription>(payload) {
                Ok(offer) => self.handle_offer(from, offer).await,
                Err(e) => warn!("Discarding malformed offer from {}: {}", from, e),
            },
            ForwardKind::Answer => match serde_json::from_value::<SessionDescription>(payload) {
                Ok(answer) => self.handle_answer(from, answer).await,
                Err(e) => warn!("Discarding malformed answer from {}: {}", from, e),
            },
            ForwardKind::Candidate => match serde_json::from_value::<IceCandidate>(payload) {
                Ok(candidate) => self.handle_candidate(from, candidate).await,
                Err(e) => warn!("Discarding malformed candidate from {}: {}", from, e),
            },
        }
    }

    async fn initiate(&mut self, target: PeerId) {
        if self.sessions.contains_key(&target) {
            debug!("Session with {} already exists", target);
            return;
        }
        let Some(local) = self.local_id else {
            warn!("Cannot connect to {} before the relay welcome", target);
            return;
        };
        if local == target {
            warn!("Refusing to connect to ourselves");
            return;
        }

        let Some(mut session) = self.new_session(target, Role::Initiator).await else {
            return;
        };
        session.apply(NegotiationEvent::Initiate);

        match session.transport().create_offer().await {
            Ok(offer) => {
                self.forward(target, ForwardKind::Offer, &offer);
                session.apply(NegotiationEvent::LocalOfferSent);
                self.sessions.insert(target, session);
            }
            Err(e) => self.fail_session(session, e).await,
        }
    }

    async fn handle_offer(&mut self, from: PeerId, offer: SessionDescription) {
        let mut carried_files = Vec::new();
        let mut carried_candidates = Vec::new();

        if self.sessions.contains_key(&from) {
            let Some(local) = self.local_id else {
                warn!("Offer from {} before the relay welcome", from);
                return;
            };
            if local < from {
                info!("Offer collision with {}: keeping our own offer", from);
                return;
            }

            info!("Offer collision with {}: yielding to the remote offer", from);
            if let Some(mut yielded) = self.sessions.remove(&from) {
                carried_files = yielded.take_queued();
                carried_candidates = yielded.take_pending_candidates();
                self.shutdown_session(yielded, CloseReason::Superseded).await;
            }
        }

        let Some(mut session) = self.new_session(from, Role::Responder).await else {
            for file in carried_files {
                self.report_unsent(from, file, "no connection to peer");
            }
            return;
        };
        for candidate in carried_candidates {
            session.buffer_candidate(candidate);
        }
        for file in carried_files {
            session.queue(file);
        }

        session.apply(NegotiationEvent::RemoteOfferReceived);
        match session.transport().accept_offer(offer).await {
            Ok(answer) => {
                session.apply(NegotiationEvent::RemoteOfferApplied);
                Self::flush_candidates(&mut session).await;
                self.forward(from, ForwardKind::Answer, &answer);
                session.apply(NegotiationEvent::LocalAnswerSent);
                self.sessions.insert(from, session);
            }
            Err(e) => self.fail_session(session, e).await,
        }
    }

    async fn handle_answer(&mut self, from: PeerId, answer: SessionDescription) {
        let Some(mut session) = self.sessions.remove(&from) else {
            warn!("Answer from {} without a session", from);
            return;
        };
        if session.state() != NegotiationState::AwaitingRemoteAnswer {
            warn!(
                "Answer from {} ignored in state {:?}",
                from,
                session.state()
            );
            self.sessions.insert(from, session);
            return;
        }

        match session.transport().apply_answer(answer).await {
            Ok(()) => {
                session.apply(NegotiationEvent::RemoteAnswerApplied);
                Self::flush_candidates(&mut session).await;
                self.sessions.insert(from, session);
            }
            Err(e) => self.fail_session(session, e).await,
        }
    }

    async fn handle_candidate(&mut self, from: PeerId, candidate: IceCandidate) {
        match self.sessions.get_mut(&from) {
            Some(session) if session.state().has_remote_description() => {
                let transport = session.transport();
                if let Err(e) = transport.add_candidate(candidate).await {
                    warn!("Failed to add candidate from {}: {}", from, e);
                }
            }
            Some(session) => {
                debug!("Buffering candidate from {}", from);
                session.buffer_candidate(candidate);
            }
            None => {
                debug!("Parking candidate from {} until a session exists", from);
                self.parked.entry(from).or_default().push(candidate);
            }
        }
    }

    async fn handle_transport(&mut self, event: SessionEvent) {
        let SessionEvent {
            peer_id,
            epoch,
            event,
        } = event;

        if self.sessions.get(&peer_id).map(ConnectionSession::epoch) != Some(epoch) {
            debug!("Ignoring stale {:?} for {} (epoch {})", event, peer_id, epoch);
            if let TransportEvent::ChannelOpen(channel) = event {
                self.spawn_teardown(Some(channel), None);
            }
            return;
        }

        match event {
            TransportEvent::CandidateGenerated(candidate) => {
                self.forward(peer_id, ForwardKind::Candidate, &candidate);
            }

            TransportEvent::ChannelOpen(channel) => {
                let Some(mut session) = self.sessions.remove(&peer_id) else {
                    return;
                };
                if session.apply(NegotiationEvent::TransportConnected) {
                    info!("Channel to {} open", peer_id);
                    session.set_channel(channel);
                    self.emit(ClientEvent::PeerConnected { peer_id });
                    for file in session.take_queued() {
                        self.start_transfer(&mut session, file);
                    }
                }
                self.sessions.insert(peer_id, session);
            }

            TransportEvent::Disconnected => {
                self.close_session(peer_id, CloseReason::TransportDisconnected)
                    .await;
            }

            TransportEvent::Message(msg) => {
                let Some(session) = self.sessions.get_mut(&peer_id) else {
                    return;
                };
                let outcomes = session.receiver_mut().accept(msg);
                for outcome in outcomes {
                    let event = match outcome {
                        ReceiveOutcome::Started {
                            transfer_id,
                            metadata,
                        } => ClientEvent::TransferStarted {
                            peer_id,
                            transfer_id,
                            direction: Direction::Incoming,
                            metadata,
                        },
                        ReceiveOutcome::Superseded { transfer_id } => {
                            ClientEvent::TransferAborted {
                                peer_id,
                                transfer_id,
                                direction: Direction::Incoming,
                                reason: "superseded by new metadata".to_owned(),
                            }
                        }
                        ReceiveOutcome::Completed { transfer_id, file } => {
                            info!(
                                "Received '{}' ({} bytes) from {}",
                                file.metadata.file_name,
                                file.data.len(),
                                peer_id
                            );
                            self.emit(ClientEvent::TransferCompleted {
                                peer_id,
                                transfer_id,
                                direction: Direction::Incoming,
                                bytes: file.data.len() as u64,
                            });
                            ClientEvent::FileReceived {
                                peer_id,
                                transfer_id,
                                file,
                            }
                        }
                    };
                    self.emit(event);
                }
            }
        }
    }

    async fn send_file(&mut self, peer_id: PeerId, file: OutgoingFile) {
        if !self.sessions.contains_key(&peer_id) {
            self.initiate(peer_id).await;
        }
        let Some(mut session) = self.sessions.remove(&peer_id) else {
            self.report_unsent(peer_id, file, "no connection to peer");
            return;
        };
        self.start_transfer(&mut session, file);
        self.sessions.insert(peer_id, session);
    }

    /// Spawns the sender task, or queues the file until the channel opens.
    fn start_transfer(&self, session: &mut ConnectionSession, file: OutgoingFile) {
        let peer_id = session.remote();
        let Some(channel) = session.channel() else {
            debug!("Queueing '{}' until {} is open", file.metadata().file_name, peer_id);
            session.queue(file);
            return;
        };

        let transfer_id = file.id();
        info!(
            "Sending '{}' ({} bytes) to {}",
            file.metadata().file_name,
            file.metadata().file_size,
            peer_id
        );
        self.emit(ClientEvent::TransferStarted {
            peer_id,
            transfer_id,
            direction: Direction::Outgoing,
            metadata: file.metadata().clone(),
        });

        let control = TransferControl::new();
        let sender = FileSender::new(channel, control.clone(), self.config.transfer.clone());
        let events = self.event_tx.clone();
        let task_control = control.clone();

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let previous = session.chain_send(done_rx);

        let task = tokio::spawn(async move {
            let _done = done_tx;
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let progress = events.clone();
            let result = sender
                .send(file, move |bytes| {
                    let _ = progress.send(ClientEvent::TransferProgress {
                        peer_id,
                        transfer_id,
                        bytes,
                    });
                })
                .await;

            match result {
                Ok(bytes) => {
                    info!("Transfer {} to {} complete", transfer_id, peer_id);
                    let _ = events.send(ClientEvent::TransferCompleted {
                        peer_id,
                        transfer_id,
                        direction: Direction::Outgoing,
                        bytes,
                    });
                }
                Err(TransferError::Cancelled) => {
                    debug!("Transfer {} cancelled", transfer_id);
                }
                Err(e) => {
                    if task_control.abort().await {
                        warn!("Transfer {} to {} failed: {}", transfer_id, peer_id, e);
                        let _ = events.send(ClientEvent::TransferAborted {
                            peer_id,
                            transfer_id,
                            direction: Direction::Outgoing,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        });

        session.track_transfer(transfer_id, TransferHandle { control, task });
    }

    /// Closes every session that has not opened within the negotiation timeout.
    pub(crate) async fn expire_stalled(&mut self, now: Instant) {
        let timeout = self.config.negotiation_timeout;
        let stalled: Vec<PeerId> = self
            .sessions
            .values()
            .filter(|s| s.is_stalled(now, timeout))
            .map(ConnectionSession::remote)
            .collect();

        for peer_id in stalled {
            warn!("Negotiation with {} timed out after {:?}", peer_id, timeout);
            self.close_session(peer_id, CloseReason::NegotiationTimeout)
                .await;
        }

        for session in self.sessions.values_mut() {
            session.prune_finished_transfers();
        }
    }

    async fn new_session(&mut self, remote: PeerId, role: Role) -> Option<ConnectionSession> {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let sink = EventSink::new(remote, epoch, self.transport_tx.clone());
        // File frames rely on ordered, reliable delivery.
        let config = TransportConfig {
            ice_servers: self.ice_servers.clone(),
            delivery: Delivery::Reliable,
        };

        match self.factory.create(remote, config, sink).await {
            Ok(transport) => {
                let mut session =
                    ConnectionSession::new(remote, role, epoch, transport, Instant::now());
                for candidate in self.parked.remove(&remote).unwrap_or_default() {
                    session.buffer_candidate(candidate);
                }
                Some(session)
            }
            Err(e) => {
                error!("Failed to create transport for {}: {}", remote, e);
                self.emit(ClientEvent::PeerDisconnected {
                    peer_id: remote,
                    reason: CloseReason::NegotiationFailed(e.to_string()),
                });
                None
            }
        }
    }

    async fn flush_candidates(session: &mut ConnectionSession) {
        let transport = session.transport();
        for candidate in session.take_pending_candidates() {
            if let Err(e) = transport.add_candidate(candidate).await {
                warn!(
                    "Failed to add buffered candidate from {}: {}",
                    session.remote(),
                    e
                );
            }
        }
    }

    async fn fail_session(&mut self, session: ConnectionSession, err: TransportError) {
        warn!("Negotiation with {} failed: {}", session.remote(), err);
        self.shutdown_session(session, CloseReason::NegotiationFailed(err.to_string()))
            .await;
    }

    async fn close_session(&mut self, peer_id: PeerId, reason: CloseReason) {
        if let Some(session) = self.sessions.remove(&peer_id) {
            self.shutdown_session(session, reason).await;
        }
    }

    async fn shutdown_session(&mut self, mut session: ConnectionSession, reason: CloseReason) {
        let peer_id = session.remote();
        info!("Closing session with {}: {}", peer_id, reason);
        session.apply(NegotiationEvent::Close(reason.clone()));

        for (transfer_id, handle) in session.take_transfers() {
            if handle.control.abort().await {
                handle.task.abort();
                self.emit(ClientEvent::TransferAborted {
                    peer_id,
                    transfer_id,
                    direction: Direction::Outgoing,
                    reason: reason.to_string(),
                });
            }
        }
        for file in session.take_queued() {
            self.report_unsent(peer_id, file, &reason.to_string());
        }
        if let Some(transfer_id) = session.receiver_mut().abort() {
            self.emit(ClientEvent::TransferAborted {
                peer_id,
                transfer_id,
                direction: Direction::Incoming,
                reason: reason.to_string(),
            });
        }

        let channel = session.take_channel();
        self.spawn_teardown(channel, Some(session.transport()));

        if reason != CloseReason::Superseded {
            self.emit(ClientEvent::PeerDisconnected { peer_id, reason });
        }
    }

    /// Closing a transport can emit into the queue this task drains, so it never
    /// runs inline. Events of the closed session carry a stale epoch and are ignored.
    fn spawn_teardown(
        &mut self,
        channel: Option<Arc<dyn DataChannel>>,
        transport: Option<Arc<dyn NegotiationTransport>>,
    ) {
        self.teardowns.retain(|task| !task.is_finished());
        self.teardowns.push(tokio::spawn(async move {
            if let Some(channel) = channel {
                channel.close().await;
            }
            if let Some(transport) = transport {
                transport.close().await;
            }
        }));
    }

    fn report_unsent(&self, peer_id: PeerId, file: OutgoingFile, reason: &str) {
        warn!(
            "Dropping '{}' for {}: {}",
            file.metadata().file_name,
            peer_id,
            reason
        );
        self.emit(ClientEvent::TransferAborted {
            peer_id,
            transfer_id: file.id(),
            direction: Direction::Outgoing,
            reason: reason.to_owned(),
        });
    }

    fn forward<T: Serialize>(&self, target_id: PeerId, kind: ForwardKind, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(payload) => self.send_relay(ClientMessage::Forward {
                target_id,
                kind,
                payload,
            }),
            Err(e) => error!("Failed to serialize {:?} for {}: {}", kind, target_id, e),
        }
    }

    fn send_relay(&self, msg: ClientMessage) {
        if self.relay_tx.send(msg).is_err() {
            error!("Relay link closed, dropping outgoing message");
        }
    }

    fn emit(&self, event: ClientEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Application stopped listening for client events");
        }
    }
}
