use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::transfer::OutgoingFile;
use crate::transport::DataChannel;
use bytes::Bytes;
use dropline_core::{ControlFrame, WireMessage};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    Pending,
    MetadataSent,
    Streaming,
    Complete,
    Aborted,
}

impl SenderPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}

/// Shared phase of one outgoing transfer. Completion and abort both settle the
/// outcome under this lock, so exactly one of them wins.
#[derive(Debug, Clone)]
pub struct TransferControl {
    phase: Arc<Mutex<SenderPhase>>,
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferControl {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(Mutex::new(SenderPhase::Pending)),
        }
    }

    pub async fn phase(&self) -> SenderPhase {
        *self.phase.lock().await
    }

    /// Returns true when this call decided the outcome.
    pub async fn abort(&self) -> bool {
        let mut phase = self.phase.lock().await;
        if phase.is_finished() {
            return false;
        }
        *phase = SenderPhase::Aborted;
        true
    }

    async fn advance(&self, to: SenderPhase) -> Result<(), TransferError> {
        let mut phase = self.phase.lock().await;
        if *phase == SenderPhase::Aborted {
            return Err(TransferError::Cancelled);
        }
        *phase = to;
        Ok(())
    }

    async fn ensure_active(&self) -> Result<(), TransferError> {
        if *self.phase.lock().await == SenderPhase::Aborted {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct FileSender {
    channel: Arc<dyn DataChannel>,
    control: TransferControl,
    config: TransferConfig,
}

impl FileSender {
    pub fn new(
        channel: Arc<dyn DataChannel>,
        control: TransferControl,
        config: TransferConfig,
    ) -> Self {
        Self {
            channel,
            control,
            config,
        }
    }

    /// Streams `file` as metadata, binary chunks, complete. Returns the number of
    /// bytes sent. `on_progress` sees the running total at most once per
    /// `progress_step` bytes.
    pub async fn send(
        &self,
        file: OutgoingFile,
        mut on_progress: impl FnMut(u64) + Send,
    ) -> Result<u64, TransferError> {
        let (id, metadata, mut source) = file.into_parts();
        let size = metadata.file_size;
        let chunk_size = self.config.chunk_size.max(1);
        let step = self.config.progress_step.max(1);

        self.control.advance(SenderPhase::MetadataSent).await?;
        self.channel
            .send(ControlFrame::Metadata(metadata).encode()?)
            .await?;
        self.control.advance(SenderPhase::Streaming).await?;

        let mut buf = vec![0u8; chunk_size];
        let mut offset = 0u64;
        let mut next_report = step;

        while offset < size {
            let want = (size - offset).min(chunk_size as u64) as usize;

            self.control.ensure_active().await?;
            let read = read_chunk(&mut source, &mut buf[..want]).await?;
            if read < want {
                return Err(TransferError::SourceTruncated {
                    expected: size,
                    read: offset + read as u64,
                });
            }

            self.control.ensure_active().await?;
            self.channel.wait_below(self.config.high_watermark).await?;
            self.channel
                .send(WireMessage::Binary(Bytes::copy_from_slice(&buf[..read])))
                .await?;
            offset += read as u64;

            if offset >= next_report {
                on_progress(offset);
                next_report = offset - offset % step + step;
            }
        }

        let mut phase = self.control.phase.lock().await;
        if *phase == SenderPhase::Aborted {
            return Err(TransferError::Cancelled);
        }
        self.channel.send(ControlFrame::Complete.encode()?).await?;
        *phase = SenderPhase::Complete;

        debug!("Transfer {} sent {} bytes", id, offset);
        Ok(offset)
    }
}

/// Fills `buf` unless the source ends first; returns how much was read.
async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
