use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FailureClass, UploadError};

/// Identifies one image for the lifetime of the session. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file picked by the user, held in memory.
///
/// The payload is reference counted so that the retained original, the
/// compressed copy and the in-flight request can share it cheaply.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file_name: String,
    pub media_type: String,
    pub data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Reads a file from disk, guessing the media type from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self::new(file_name, guess_media_type(path), data))
    }

    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Guesses a media type from the file extension
pub fn guess_media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("heic") | Some("heif") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Metadata returned by the media host for a stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub url: String,
    pub remote_id: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Classified failure kept on a `Failed` item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub class: FailureClass,
    pub detail: String,
}

impl ItemFailure {
    /// Payload rejections would fail again with the same bytes.
    pub fn is_retryable(&self) -> bool {
        self.class != FailureClass::Payload
    }

    pub fn user_message(&self) -> String {
        match self.class {
            FailureClass::Network => {
                "Network problem while uploading. Check your connection and retry.".to_string()
            }
            FailureClass::Configuration => {
                "The photo service refused the upload configuration. Retry later.".to_string()
            }
            FailureClass::Payload => format!(
                "The photo service rejected this file ({}). Choose a different photo.",
                self.detail
            ),
        }
    }
}

impl From<&UploadError> for ItemFailure {
    fn from(err: &UploadError) -> Self {
        Self {
            class: err.class(),
            detail: err.to_string(),
        }
    }
}

/// Lifecycle of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Compressing,
    Uploading,
    Complete { descriptor: RemoteDescriptor },
    Failed { failure: ItemFailure },
}

/// Whether a completed upload was recorded by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "record", content = "message", rename_all = "snake_case")]
pub enum RecordStatus {
    /// No persistence collaborator configured, or upload not complete yet.
    NotRequested,
    Pending,
    Recorded,
    /// Saved remotely but not recorded.
    NotRecorded(String),
}

/// Snapshot of one image as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageItem {
    pub id: ImageId,
    pub file_name: String,
    pub media_type: String,
    /// Size of the file as picked, before compression
    pub byte_size: u64,
    pub state: ItemState,
    pub progress_percent: u8,
    pub is_cover: bool,
    /// Upload attempt number, starting at 1 and bumped by every retry
    pub attempt: u32,
    pub record: RecordStatus,
}

impl ImageItem {
    pub fn descriptor(&self) -> Option<&RemoteDescriptor> {
        match &self.state {
            ItemState::Complete { descriptor } => Some(descriptor),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match &self.state {
            ItemState::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    /// Compression, upload or the follow-up record call is still running.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            ItemState::Pending | ItemState::Compressing | ItemState::Uploading
        ) || self.record == RecordStatus::Pending
    }
}

/// Who a finished upload belongs to, passed through to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl OwnerContext {
    pub fn new(owner_id: impl Into<String>, record_id: Option<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            record_id,
        }
    }
}

/// One entry of the list handed over at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalImage {
    pub id: ImageId,
    pub position: usize,
    pub is_cover: bool,
    pub descriptor: RemoteDescriptor,
}

/// Outcome of a batch once nothing is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Completed uploads the persistence collaborator could not record
    pub unrecorded: usize,
    pub items: Vec<ImageItem>,
}

impl BatchSummary {
    pub fn from_items(items: Vec<ImageItem>) -> Self {
        let succeeded = items.iter().filter(|i| i.descriptor().is_some()).count();
        let failed = items.iter().filter(|i| i.failure().is_some()).count();
        let unrecorded = items
            .iter()
            .filter(|i| matches!(i.record, RecordStatus::NotRecorded(_)))
            .count();
        Self {
            succeeded,
            failed,
            unrecorded,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_media_type() {
        assert_eq!(guess_media_type(Path::new("a/b/Front.JPG")), "image/jpeg");
        assert_eq!(guess_media_type(Path::new("kitchen.webp")), "image/webp");
        assert_eq!(
            guess_media_type(Path::new("notes.txt")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garden.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let file = SourceFile::from_path(&path).unwrap();
        assert_eq!(file.file_name, "garden.png");
        assert_eq!(file.media_type, "image/png");
        assert_eq!(file.byte_size(), 16);
    }

    #[test]
    fn test_payload_failures_are_not_retryable() {
        let payload = ItemFailure::from(&UploadError::Payload("corrupt".into()));
        assert!(!payload.is_retryable());
        assert!(payload.user_message().contains("corrupt"));

        let network = ItemFailure::from(&UploadError::TransientNetwork("reset".into()));
        assert!(network.is_retryable());
    }
}
