use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
pub const DEFAULT_HIGH_WATERMARK: usize = 1024 * 1024;
pub const DEFAULT_PROGRESS_STEP: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Largest binary frame emitted by a sender.
    pub chunk_size: usize,
    /// Senders pause while the channel buffers more than this many bytes.
    pub high_watermark: usize,
    /// Minimum number of bytes between two progress events.
    pub progress_step: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sessions that are not open after this long are closed.
    pub negotiation_timeout: Duration,
    pub sweep_interval: Duration,
    pub transfer: TransferConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            transfer: TransferConfig::default(),
        }
    }
}
