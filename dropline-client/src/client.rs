use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::orchestrator::{ClientCommand, ClientEvent, PeerOrchestrator};
use crate::relay_client::RelayLink;
use crate::transfer::{OutgoingFile, TransferId};
use crate::transport::TransportFactory;
use dropline_core::PeerId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

const COMMAND_BUFFER: usize = 64;

/// Application handle for one relay connection and all of its peer sessions.
pub struct Client {
    commands: mpsc::Sender<ClientCommand>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    task: JoinHandle<()>,
}

impl Client {
    /// Runs an orchestrator over an already established relay link.
    pub fn start(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
        relay: RelayLink,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, events) = mpsc::unbounded_channel();
        let orchestrator = PeerOrchestrator::new(config, factory, relay, command_rx, event_tx);
        let task = tokio::spawn(orchestrator.run());

        Self {
            commands,
            events,
            task,
        }
    }

    pub async fn connect(
        endpoint: &str,
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self, ClientError> {
        let relay = RelayLink::connect(endpoint).await?;
        Ok(Self::start(config, factory, relay))
    }

    pub async fn join(
        &self,
        room: impl Into<String>,
        name: Option<String>,
    ) -> Result<(), ClientError> {
        self.command(ClientCommand::Join {
            room: room.into(),
            name,
        })
        .await
    }

    pub async fn request_presence(&self) -> Result<(), ClientError> {
        self.command(ClientCommand::RequestPresence).await
    }

    pub async fn connect_to(&self, peer_id: PeerId) -> Result<(), ClientError> {
        self.command(ClientCommand::Connect(peer_id)).await
    }

    /// Queues `file` for `peer_id`, negotiating a connection first if needed.
    pub async fn send_file(
        &self,
        peer_id: PeerId,
        file: OutgoingFile,
    ) -> Result<TransferId, ClientError> {
        let id = file.id();
        self.command(ClientCommand::SendFile { peer_id, file }).await?;
        Ok(id)
    }

    pub async fn close_peer(&self, peer_id: PeerId) -> Result<(), ClientError> {
        self.command(ClientCommand::Close(peer_id)).await
    }

    /// `None` once the orchestrator has stopped and every event was drained.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Closes every session and waits for the orchestrator to stop.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!("Orchestrator task ended abnormally: {}", e);
        }
    }

    async fn command(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        self.commands.send(cmd).await.map_err(|_| ClientError::Closed)
    }
}
