use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport setup failed: {0:#}")]
    Setup(anyhow::Error),

    #[error(transparent)]
    Rtc(#[from] webrtc::Error),

    #[error("remote description has not been applied")]
    NoRemoteDescription,

    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    #[error("data channel is closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] dropline_core::FrameError),

    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),

    #[error("source ended after {read} of {expected} bytes")]
    SourceTruncated { expected: u64, read: u64 },

    #[error("transfer was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported relay url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("relay connection failed: {0}")]
    RelayConnect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("client has shut down")]
    Closed,
}
