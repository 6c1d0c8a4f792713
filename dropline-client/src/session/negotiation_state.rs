use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    NegotiatingLocalOffer,
    AwaitingRemoteAnswer,
    ReceivedRemoteOffer,
    NegotiatingLocalAnswer,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The application asked for it.
    Local,
    PeerLeft,
    TransportDisconnected,
    NegotiationTimeout,
    NegotiationFailed(String),
    /// Replaced by the remote side's offer after both sides offered at once.
    Superseded,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::PeerLeft => f.write_str("peer left the room"),
            Self::TransportDisconnected => f.write_str("transport disconnected"),
            Self::NegotiationTimeout => f.write_str("negotiation timed out"),
            Self::NegotiationFailed(e) => write!(f, "negotiation failed: {e}"),
            Self::Superseded => f.write_str("superseded by remote offer"),
            Self::Shutdown => f.write_str("client shut down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEvent {
    Initiate,
    LocalOfferSent,
    RemoteAnswerApplied,
    RemoteOfferReceived,
    RemoteOfferApplied,
    LocalAnswerSent,
    TransportConnected,
    Close(CloseReason),
}

impl NegotiationState {
    /// The state `event` leads to, or `None` when the pair is not a valid transition.
    pub fn next(self, event: &NegotiationEvent) -> Option<NegotiationState> {
        use NegotiationEvent as E;
        use NegotiationState as S;

        match (self, event) {
            (S::Idle, E::Initiate) => Some(S::NegotiatingLocalOffer),
            (S::NegotiatingLocalOffer, E::LocalOfferSent) => Some(S::AwaitingRemoteAnswer),
            (S::AwaitingRemoteAnswer, E::RemoteAnswerApplied) => Some(S::Connecting),
            (S::Idle, E::RemoteOfferReceived) => Some(S::ReceivedRemoteOffer),
            (S::ReceivedRemoteOffer, E::RemoteOfferApplied) => Some(S::NegotiatingLocalAnswer),
            (S::NegotiatingLocalAnswer, E::LocalAnswerSent) => Some(S::Connecting),
            (S::Connecting, E::TransportConnected) => Some(S::Open),
            (S::Closed, E::Close(_)) => None,
            (_, E::Close(_)) => Some(S::Closed),
            _ => None,
        }
    }

    /// Remote candidates can be applied directly from here on.
    pub fn has_remote_description(self) -> bool {
        matches!(self, Self::NegotiatingLocalAnswer | Self::Connecting | Self::Open)
    }

    pub fn is_live(self) -> bool {
        self != Self::Closed
    }
}
