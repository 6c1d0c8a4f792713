use crate::transfer::TransferId;
use bytes::{Bytes, BytesMut};
use dropline_core::{ControlFrame, FileMetadata, WireMessage};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    AwaitingMetadata,
    Assembling,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub metadata: FileMetadata,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Started {
        transfer_id: TransferId,
        metadata: FileMetadata,
    },
    /// Newer metadata arrived before this transfer completed.
    Superseded { transfer_id: TransferId },
    Completed {
        transfer_id: TransferId,
        file: ReceivedFile,
    },
}

/// Reassembles files from the frames of one channel.
#[derive(Debug)]
pub struct FileReceiver {
    phase: ReceiverPhase,
    current: Option<(TransferId, FileMetadata)>,
    fragments: Vec<Bytes>,
    received: u64,
}

impl Default for FileReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FileReceiver {
    pub fn new() -> Self {
        Self {
            phase: ReceiverPhase::AwaitingMetadata,
            current: None,
            fragments: Vec::new(),
            received: 0,
        }
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    pub fn received_bytes(&self) -> u64 {
        self.received
    }

    pub fn accept(&mut self, msg: WireMessage) -> Vec<ReceiveOutcome> {
        let mut out = Vec::new();
        if self.phase == ReceiverPhase::Aborted {
            debug!("Receiver aborted, ignoring {} byte frame", msg.len());
            return out;
        }

        match msg {
            WireMessage::Binary(chunk) => {
                if self.phase != ReceiverPhase::Assembling {
                    warn!("Discarding {} byte chunk received before metadata", chunk.len());
                    return out;
                }
                self.received += chunk.len() as u64;
                self.fragments.push(chunk);
            }

            WireMessage::Text(text) => match ControlFrame::decode(&text) {
                Err(e) => warn!("Discarding control frame: {}", e),

                Ok(ControlFrame::Metadata(metadata)) => {
                    if let Some((old, old_meta)) = self.current.take() {
                        warn!(
                            "Metadata for '{}' replaces unfinished '{}' after {} bytes",
                            metadata.file_name, old_meta.file_name, self.received
                        );
                        out.push(ReceiveOutcome::Superseded { transfer_id: old });
                    }
                    self.reset();

                    let transfer_id = TransferId::new();
                    self.current = Some((transfer_id, metadata.clone()));
                    self.phase = ReceiverPhase::Assembling;
                    out.push(ReceiveOutcome::Started {
                        transfer_id,
                        metadata,
                    });
                }

                Ok(ControlFrame::Complete) => {
                    let Some((transfer_id, metadata)) = self.current.take() else {
                        warn!("Discarding complete frame received before metadata");
                        return out;
                    };

                    let mut data = BytesMut::with_capacity(self.received as usize);
                    for fragment in self.fragments.drain(..) {
                        data.extend_from_slice(&fragment);
                    }
                    if data.len() as u64 != metadata.file_size {
                        warn!(
                            "'{}' declared {} bytes but {} arrived",
                            metadata.file_name,
                            metadata.file_size,
                            data.len()
                        );
                    }
                    self.reset();

                    out.push(ReceiveOutcome::Completed {
                        transfer_id,
                        file: ReceivedFile {
                            metadata,
                            data: data.freeze(),
                        },
                    });
                }
            },
        }
        out
    }

    /// Drops any partial file; returns its id when one was in progress.
    pub fn abort(&mut self) -> Option<TransferId> {
        let current = self.current.take().map(|(id, _)| id);
        self.fragments.clear();
        self.received = 0;
        self.phase = ReceiverPhase::Aborted;
        current
    }

    fn reset(&mut self) {
        self.fragments.clear();
        self.received = 0;
        self.phase = ReceiverPhase::AwaitingMetadata;
    }
}
