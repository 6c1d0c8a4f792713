use crate::error::ClientError;
use crate::transfer::TransferId;
use bytes::Bytes;
use dropline_core::FileMetadata;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use tokio::io::AsyncRead;

const DEFAULT_FILE_NAME: &str = "file";

/// A file queued for sending: its declared metadata plus a byte source that must
/// yield exactly `file_size` bytes.
pub struct OutgoingFile {
    id: TransferId,
    metadata: FileMetadata,
    source: Box<dyn AsyncRead + Send + Sync + Unpin>,
}

impl OutgoingFile {
    pub fn from_reader(
        metadata: FileMetadata,
        source: impl AsyncRead + Send + Sync + Unpin + 'static,
    ) -> Self {
        Self {
            id: TransferId::new(),
            metadata,
            source: Box::new(source),
        }
    }

    pub fn from_bytes(
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        let metadata = FileMetadata {
            file_name: file_name.into(),
            file_size: data.len() as u64,
            file_type: file_type.into(),
        };
        Self::from_reader(metadata, Cursor::new(data))
    }

    /// Opens `path`, guessing the content type from its extension.
    pub async fn open(path: &Path) -> Result<Self, ClientError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_owned();
        let file_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();

        Ok(Self::from_reader(
            FileMetadata {
                file_name,
                file_size,
                file_type,
            },
            file,
        ))
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub(crate) fn into_parts(
        self,
    ) -> (TransferId, FileMetadata, Box<dyn AsyncRead + Send + Sync + Unpin>) {
        (self.id, self.metadata, self.source)
    }
}

impl fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
