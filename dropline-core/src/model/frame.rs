use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared identity of a file, sent once before its binary chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
}

/// Structured frames of the transfer protocol, carried as text messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Starts a transfer. Resets any accumulation on the receiver.
    Metadata(FileMetadata),
    /// Ends a transfer.
    Complete,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed control frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ControlFrame {
    pub fn encode(&self) -> Result<WireMessage, FrameError> {
        Ok(WireMessage::Text(serde_json::to_string(self)?))
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A single data channel message: control frames travel as text, file content as binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
}

impl WireMessage {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
