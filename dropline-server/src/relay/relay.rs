use crate::relay::relay_command::RelayCommand;
use crate::room::{LeaveOutcome, RoomRegistry};
use crate::signaling::SignalingOutput;
use dropline_core::{ForwardKind, PeerId, RoomCode, ServerMessage};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 256;

/// Single owner of room membership. Commands are applied one at a time and every
/// resulting message is handed to the output before the next command is read, so a
/// presence broadcast always matches the membership change that caused it.
pub struct Relay {
    registry: RoomRegistry,
    command_rx: mpsc::Receiver<RelayCommand>,
    output: Arc<dyn SignalingOutput>,
}

impl Relay {
    pub fn new(command_rx: mpsc::Receiver<RelayCommand>, output: Arc<dyn SignalingOutput>) -> Self {
        Self {
            registry: RoomRegistry::new(),
            command_rx,
            output,
        }
    }

    /// Spawns the actor and returns its command sender.
    pub fn spawn(output: Arc<dyn SignalingOutput>) -> mpsc::Sender<RelayCommand> {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(Relay::new(rx, output).run());
        tx
    }

    pub async fn run(mut self) {
        info!("Relay event loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;
        }

        info!(
            "Command channel closed, relay stopping with {} rooms",
            self.registry.room_count()
        );
    }

    async fn handle_command(&mut self, cmd: RelayCommand) {
        match cmd {
            RelayCommand::Join {
                peer_id,
                room,
                name,
            } => self.handle_join(peer_id, room, name).await,

            RelayCommand::Forward {
                sender_id,
                target_id,
                kind,
                payload,
            } => self.handle_forward(sender_id, target_id, kind, payload).await,

            RelayCommand::Presence { peer_id } => {
                let snapshot = self
                    .registry
                    .room_of(&peer_id)
                    .and_then(|code| self.registry.snapshot(code));

                let msg = match snapshot {
                    Some(members) => ServerMessage::Presence { members },
                    None => ServerMessage::Error {
                        message: "join a room before requesting presence".to_owned(),
                    },
                };
                self.output.send(peer_id, msg).await;
            }

            RelayCommand::Leave { peer_id } => {
                if let Some(outcome) = self.registry.leave(&peer_id) {
                    info!("Peer {} left room '{}'", peer_id, outcome.room);
                    self.announce_leave(peer_id, outcome).await;
                }
            }
        }
    }

    async fn handle_join(&mut self, peer_id: PeerId, room: RoomCode, name: Option<String>) {
        let outcome = self.registry.join(peer_id, room, name.clone());
        info!(
            "Peer {} joined room '{}' ({} members)",
            peer_id,
            outcome.room,
            outcome.members.len()
        );

        if let Some(left) = outcome.left {
            self.announce_leave(peer_id, left).await;
        }

        self.output
            .send(
                peer_id,
                ServerMessage::Joined {
                    peer_id,
                    room: outcome.room,
                },
            )
            .await;
        self.output
            .send(
                peer_id,
                ServerMessage::Presence {
                    members: outcome.members,
                },
            )
            .await;

        for member in outcome.notify {
            self.output
                .send(
                    member,
                    ServerMessage::PeerJoined {
                        peer_id,
                        name: name.clone(),
                    },
                )
                .await;
        }
    }

    async fn handle_forward(
        &mut self,
        sender_id: PeerId,
        target_id: PeerId,
        kind: ForwardKind,
        payload: Value,
    ) {
        if let Err(miss) = self.registry.route(&sender_id, &target_id) {
            warn!("Dropping {:?} from {}: {}", kind, sender_id, miss);
            return;
        }

        debug!("Forwarding {:?} {} -> {}", kind, sender_id, target_id);
        let delivered = self
            .output
            .send(
                target_id,
                ServerMessage::Forward {
                    sender_id,
                    kind,
                    payload,
                },
            )
            .await;

        if !delivered {
            warn!(
                "Dropping {:?} from {}: target {} already disconnected",
                kind, sender_id, target_id
            );
        }
    }

    async fn announce_leave(&self, peer_id: PeerId, outcome: LeaveOutcome) {
        for member in outcome.remaining {
            self.output
                .send(member, ServerMessage::PeerLeft { peer_id })
                .await;
        }
    }
}
