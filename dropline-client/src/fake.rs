//! In-memory transports for exercising the orchestrator without a network stack.
//!
//! Two orchestrators sharing one [`FakeNetwork`] negotiate exactly like real peers:
//! offers and answers carry an opaque link token instead of SDP, each side emits one
//! synthetic candidate, and the channel pair opens once the initiator applies the
//! answer.

use crate::error::TransportError;
use crate::transport::{
    DataChannel, EventSink, NegotiationTransport, TransportConfig, TransportEvent,
    TransportFactory,
};
use async_trait::async_trait;
use dropline_core::{IceCandidate, PeerId, SdpKind, SessionDescription, WireMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::debug;
use uuid::Uuid;

const TOKEN_PREFIX: &str = "fake:";

struct PendingLink {
    initiator: EventSink,
    initiator_state: Arc<Mutex<FakeState>>,
    responder: Option<(EventSink, Arc<Mutex<FakeState>>)>,
}

#[derive(Default)]
pub struct FakeNetwork {
    links: Mutex<HashMap<String, PendingLink>>,
    applied: Mutex<Vec<(PeerId, IceCandidate)>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn factory(self: &Arc<Self>) -> FakeTransportFactory {
        FakeTransportFactory {
            network: self.clone(),
        }
    }

    /// Candidates that transports talking to `remote` have applied, in order.
    pub async fn candidates_from(&self, remote: PeerId) -> Vec<IceCandidate> {
        self.applied
            .lock()
            .await
            .iter()
            .filter(|(peer, _)| *peer == remote)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct FakeTransportFactory {
    network: Arc<FakeNetwork>,
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        remote: PeerId,
        _config: TransportConfig,
        events: EventSink,
    ) -> Result<Arc<dyn NegotiationTransport>, TransportError> {
        debug!("[FakeNetwork] new transport towards {}", remote);
        Ok(Arc::new(FakeTransport {
            network: self.network.clone(),
            events,
            state: Arc::new(Mutex::new(FakeState::default())),
        }))
    }
}

#[derive(Default)]
struct FakeState {
    token: Option<String>,
    remote_applied: bool,
    channel: Option<Arc<FakeChannel>>,
    remote: Option<EventSink>,
    closed: bool,
}

pub struct FakeTransport {
    network: Arc<FakeNetwork>,
    events: EventSink,
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    fn local_candidate(token: &str, role: &str) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{role} 1 udp 2122260223 {token} 9 typ host"),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        }
    }
}

fn token_of(desc: &SessionDescription) -> Result<&str, TransportError> {
    desc.sdp
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| TransportError::InvalidDescription(desc.sdp.clone()))
}

#[async_trait]
impl NegotiationTransport for FakeTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let token = Uuid::new_v4().simple().to_string();
        self.state.lock().await.token = Some(token.clone());

        self.network.links.lock().await.insert(
            token.clone(),
            PendingLink {
                initiator: self.events.clone(),
                initiator_state: self.state.clone(),
                responder: None,
            },
        );

        self.events
            .emit(TransportEvent::CandidateGenerated(Self::local_candidate(
                &token, "offer",
            )))
            .await;
        Ok(SessionDescription::offer(format!("{TOKEN_PREFIX}{token}")))
    }

    async fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        if offer.kind != SdpKind::Offer {
            return Err(TransportError::InvalidDescription("expected offer".into()));
        }
        let token = token_of(&offer)?.to_owned();

        {
            let mut links = self.network.links.lock().await;
            let link = links.get_mut(&token).ok_or_else(|| {
                TransportError::InvalidDescription(format!("unknown link {token}"))
            })?;
            link.responder = Some((self.events.clone(), self.state.clone()));
        }

        {
            let mut state = self.state.lock().await;
            state.token = Some(token.clone());
            state.remote_applied = true;
        }

        self.events
            .emit(TransportEvent::CandidateGenerated(Self::local_candidate(
                &token, "answer",
            )))
            .await;
        Ok(SessionDescription::answer(format!("{TOKEN_PREFIX}{token}")))
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), TransportError> {
        if answer.kind != SdpKind::Answer {
            return Err(TransportError::InvalidDescription("expected answer".into()));
        }
        let token = token_of(&answer)?.to_owned();

        let link = self
            .network
            .links
            .lock()
            .await
            .remove(&token)
            .ok_or_else(|| TransportError::InvalidDescription(format!("unknown link {token}")))?;
        let Some((responder, responder_state)) = link.responder else {
            return Err(TransportError::InvalidDescription(format!(
                "link {token} was never answered"
            )));
        };

        let (ours, theirs) = FakeChannel::pair(link.initiator.clone(), responder.clone());
        {
            let mut state = link.initiator_state.lock().await;
            state.remote_applied = true;
            state.channel = Some(ours.clone());
            state.remote = Some(responder.clone());
        }
        {
            let mut state = responder_state.lock().await;
            state.channel = Some(theirs.clone());
            state.remote = Some(link.initiator.clone());
        }

        link.initiator.emit(TransportEvent::ChannelOpen(ours)).await;
        responder.emit(TransportEvent::ChannelOpen(theirs)).await;
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        if !self.state.lock().await.remote_applied {
            return Err(TransportError::NoRemoteDescription);
        }
        self.network
            .applied
            .lock()
            .await
            .push((self.events.peer_id(), candidate));
        Ok(())
    }

    async fn close(&self) {
        let (channel, remote, token) = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            (state.channel.take(), state.remote.take(), state.token.take())
        };

        if let Some(token) = token {
            self.network.links.lock().await.remove(&token);
        }
        if let Some(channel) = channel {
            channel.close().await;
        }
        if let Some(remote) = remote {
            remote.emit(TransportEvent::Disconnected).await;
        }
    }
}

/// One end of an in-memory channel. Sends are queued and delivered to the other
/// end's sink by a pump task, so the buffered amount rises and falls like a real
/// channel's.
pub struct FakeChannel {
    open: Arc<AtomicBool>,
    drained: Arc<Notify>,
    buffered: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    queue: mpsc::UnboundedSender<WireMessage>,
}

impl FakeChannel {
    /// `a` receives what the second end sends and vice versa.
    pub fn pair(a: EventSink, b: EventSink) -> (Arc<Self>, Arc<Self>) {
        let open = Arc::new(AtomicBool::new(true));
        let drained = Arc::new(Notify::new());
        let to_b = Self::end(b, open.clone(), drained.clone());
        let to_a = Self::end(a, open, drained);
        (to_b, to_a)
    }

    fn end(remote: EventSink, open: Arc<AtomicBool>, drained: Arc<Notify>) -> Arc<Self> {
        let (queue, mut rx) = mpsc::unbounded_channel::<WireMessage>();
        let buffered = Arc::new(AtomicUsize::new(0));

        let pump_open = open.clone();
        let pump_drained = drained.clone();
        let pump_buffered = buffered.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let len = msg.len();
                if pump_open.load(Ordering::SeqCst) {
                    remote.emit(TransportEvent::Message(msg)).await;
                }
                pump_buffered.fetch_sub(len, Ordering::SeqCst);
                pump_drained.notify_waiters();
            }
        });

        Arc::new(Self {
            open,
            drained,
            buffered,
            peak: Arc::new(AtomicUsize::new(0)),
            queue,
        })
    }

    /// Highest buffered amount observed right after a send.
    pub fn peak_buffered(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataChannel for FakeChannel {
    async fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ChannelClosed);
        }
        let now = self.buffered.fetch_add(msg.len(), Ordering::SeqCst) + msg.len();
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.queue
            .send(msg)
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.drained.notify_waiters();
    }

    async fn wait_below(&self, watermark: usize) -> Result<(), TransportError> {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_open() {
                return Err(TransportError::ChannelClosed);
            }
            if self.buffered.load(Ordering::SeqCst) <= watermark {
                return Ok(());
            }
            notified.await;
        }
    }
}
