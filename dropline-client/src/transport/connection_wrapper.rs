use crate::error::TransportError;
use crate::transport::{
    DataChannel, EventSink, NegotiationTransport, TransportConfig, TransportEvent,
    TransportFactory,
};
use anyhow::Context;
use async_trait::async_trait;
use dropline_core::{Delivery, IceCandidate, PeerId, SdpKind, SessionDescription, WireMessage};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const CHANNEL_LABEL: &str = "dropline";

/// Builds [`ConnectionWrapper`]s backed by the `webrtc` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcTransportFactory;

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        remote: PeerId,
        config: TransportConfig,
        events: EventSink,
    ) -> Result<Arc<dyn NegotiationTransport>, TransportError> {
        let wrapper = ConnectionWrapper::new(remote, config, events).await?;
        Ok(Arc::new(wrapper))
    }
}

pub struct ConnectionWrapper {
    pub peer_id: PeerId,
    peer_connection: Arc<RTCPeerConnection>,
    delivery: Delivery,
    events: EventSink,
}

impl ConnectionWrapper {
    pub async fn new(
        peer_id: PeerId,
        config: TransportConfig,
        events: EventSink,
    ) -> Result<Self, TransportError> {
        let peer_connection = Arc::new(
            build_peer_connection(&config)
                .await
                .map_err(TransportError::Setup)?,
        );

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();

                Box::pin(async move {
                    info!(
                        "Peer connection state for {} changed: {:?}",
                        events.peer_id(),
                        s
                    );
                    match s {
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => {
                            events.emit(TransportEvent::Disconnected).await;
                        }
                        _ => {}
                    }
                })
            },
        ));

        // Trickle ICE: every local candidate goes out through the relay.
        let ice_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = ice_events.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        events
                            .emit(TransportEvent::CandidateGenerated(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_m_line_index: init.sdp_mline_index,
                            }))
                            .await;
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        // The responder learns about the channel from the remote side.
        let dc_events = events.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let events = dc_events.clone();

            Box::pin(async move {
                debug!(
                    "Inbound DataChannel '{}' from {}",
                    dc.label(),
                    events.peer_id()
                );
                wire_channel(dc, events);
            })
        }));

        Ok(Self {
            peer_id,
            peer_connection,
            delivery: config.delivery,
            events,
        })
    }
}

#[async_trait]
impl NegotiationTransport for ConnectionWrapper {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let init = RTCDataChannelInit {
            ordered: Some(self.delivery.is_ordered()),
            max_retransmits: self.delivery.max_retransmits(),
            ..Default::default()
        };
        let dc = self
            .peer_connection
            .create_data_channel(CHANNEL_LABEL, Some(init))
            .await?;
        wire_channel(dc, self.events.clone());

        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        expect_kind(&offer, SdpKind::Offer)?;
        let desc = RTCSessionDescription::offer(offer.sdp)?;
        self.peer_connection.set_remote_description(desc).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), TransportError> {
        expect_kind(&answer, SdpKind::Answer)?;
        let desc = RTCSessionDescription::answer(answer.sdp)?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Failed to close connection to {}: {}", self.peer_id, e);
        }
    }
}

pub struct RtcDataChannel {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    async fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        match msg {
            WireMessage::Text(text) => self.channel.send_text(text).await?,
            WireMessage::Binary(data) => self.channel.send(&data).await?,
        };
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        self.channel.buffered_amount().await
    }

    fn is_open(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            debug!("DataChannel close failed: {}", e);
        }
    }
}

async fn build_peer_connection(config: &TransportConfig) -> anyhow::Result<RTCPeerConnection> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()
        .context("Failed to register codecs")?;
    let registry = register_default_interceptors(Registry::new(), &mut m)
        .context("Failed to register interceptors")?;

    let api = APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    api.new_peer_connection(rtc_config)
        .await
        .context("Failed to create peer connection")
}

/// Reports the channel once it opens and forwards every frame it carries.
fn wire_channel(dc: Arc<RTCDataChannel>, events: EventSink) {
    let open_events = events.clone();
    let opened = dc.clone();
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            info!("DataChannel open to {}", open_events.peer_id());
            open_events
                .emit(TransportEvent::ChannelOpen(Arc::new(RtcDataChannel {
                    channel: opened,
                })))
                .await;
        })
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = events.clone();
        Box::pin(async move {
            let wire = if msg.is_string {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => WireMessage::Text(text),
                    Err(e) => {
                        warn!("Dropping non-UTF-8 text frame: {}", e);
                        return;
                    }
                }
            } else {
                WireMessage::Binary(msg.data)
            };
            events.emit(TransportEvent::Message(wire)).await;
        })
    }));
}

fn expect_kind(desc: &SessionDescription, kind: SdpKind) -> Result<(), TransportError> {
    if desc.kind == kind {
        Ok(())
    } else {
        Err(TransportError::InvalidDescription(format!(
            "expected {:?}, got {:?}",
            kind, desc.kind
        )))
    }
}
