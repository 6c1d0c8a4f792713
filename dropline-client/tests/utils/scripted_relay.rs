use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use dropline_client::fake::FakeNetwork;
use dropline_client::{
    Client, EventSink, NegotiationTransport, RelayEnd, RelayLink, SessionEvent, TransportConfig,
    TransportFactory,
};
use dropline_core::{ClientMessage, ForwardKind, PeerId, ServerMessage};

use crate::utils::{EVENT_TIMEOUT, test_config};

/// Plays the relay by hand so a test controls message order exactly.
pub struct ScriptedRelay {
    end: RelayEnd,
}

impl ScriptedRelay {
    /// Starts a client behind a scripted relay and welcomes it as `local`.
    pub fn start(network: &Arc<FakeNetwork>, local: PeerId) -> (Client, ScriptedRelay) {
        Self::start_with(Arc::new(network.factory()), local)
    }

    pub fn start_with(
        factory: Arc<dyn TransportFactory>,
        local: PeerId,
    ) -> (Client, ScriptedRelay) {
        let (link, end) = RelayLink::pair();
        let client = Client::start(test_config(), factory, link);
        let relay = ScriptedRelay { end };
        relay.push(ServerMessage::Welcome { peer_id: local });
        (client, relay)
    }

    pub fn push(&self, msg: ServerMessage) {
        self.end
            .to_client
            .send(msg)
            .expect("Client dropped its relay link");
    }

    pub fn forward_from(
        &self,
        sender_id: PeerId,
        kind: ForwardKind,
        payload: &impl serde::Serialize,
    ) {
        self.push(ServerMessage::Forward {
            sender_id,
            kind,
            payload: serde_json::to_value(payload).expect("Payload must serialize"),
        });
    }

    /// Next forward of `kind` the client sent, skipping everything else.
    pub async fn expect_forward(&mut self, kind: ForwardKind) -> (PeerId, Value) {
        timeout(EVENT_TIMEOUT, async {
            loop {
                match self.end.from_client.recv().await {
                    Some(ClientMessage::Forward {
                        target_id,
                        kind: k,
                        payload,
                    }) if k == kind => return (target_id, payload),
                    Some(_) => continue,
                    None => panic!("Client closed its relay link"),
                }
            }
        })
        .await
        .expect("Timed out waiting for forward")
    }

    /// True when the client sends no forward of `kind` within `window`.
    pub async fn sends_no(&mut self, kind: ForwardKind, window: Duration) -> bool {
        timeout(window, async {
            loop {
                match self.end.from_client.recv().await {
                    Some(ClientMessage::Forward { kind: k, .. }) if k == kind => return,
                    Some(_) => continue,
                    None => std::future::pending::<()>().await,
                }
            }
        })
        .await
        .is_err()
    }
}

/// A transport on the fake network driven directly by the test, standing in for a
/// remote client. Its events land in the returned receiver.
pub async fn remote_transport(
    network: &Arc<FakeNetwork>,
    towards: PeerId,
) -> (Arc<dyn NegotiationTransport>, mpsc::Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel(256);
    let transport = network
        .factory()
        .create(towards, TransportConfig::default(), EventSink::new(towards, 1, tx))
        .await
        .expect("Fake transports always build");
    (transport, rx)
}

/// Two fresh ids, smaller first.
pub fn ordered_ids() -> (PeerId, PeerId) {
    let (a, b) = (PeerId::new(), PeerId::new());
    if a < b { (a, b) } else { (b, a) }
}
