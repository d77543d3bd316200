//! Error types for the upload pipeline.
//!
//! Each stage has its own error enum. Only `ValidationError` and the
//! exhausted-preset case of `UploadError` ever reach the immediate caller;
//! everything that happens after registration is recorded on the item.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::ImageId;

/// A file was refused before it was registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{file_name}: media type '{media_type}' is not an accepted image type")]
    UnsupportedType {
        file_name: String,
        media_type: String,
    },

    #[error("{file_name}: {size} bytes exceeds the limit of {max} bytes")]
    TooLarge {
        file_name: String,
        size: u64,
        max: u64,
    },

    #[error("{file_name}: file is empty")]
    EmptyFile { file_name: String },

    #[error("{file_name}: no more than {max} photos can be added")]
    CountLimit { file_name: String, max: usize },
}

impl ValidationError {
    pub fn file_name(&self) -> &str {
        match self {
            ValidationError::UnsupportedType { file_name, .. }
            | ValidationError::TooLarge { file_name, .. }
            | ValidationError::EmptyFile { file_name }
            | ValidationError::CountLimit { file_name, .. } => file_name,
        }
    }
}

/// Compression is best effort; these never fail an item.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("no encoder for media type '{0}'")]
    UnsupportedFormat(String),

    #[error("compression task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification of an upload failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Connection problems and timeouts. Retrying may help.
    Network,
    /// The preset was refused by the media host.
    Configuration,
    /// The host refused the bytes themselves.
    Payload,
}

/// Failure of a single upload attempt or of the whole preset fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("upload preset '{preset}' was rejected: {message}")]
    Configuration { preset: String, message: String },

    #[error("every upload preset was rejected (tried: {})", presets.join(", "))]
    PresetsExhausted { presets: Vec<String> },

    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("file rejected by media host: {0}")]
    Payload(String),
}

impl UploadError {
    pub fn class(&self) -> FailureClass {
        match self {
            UploadError::Configuration { .. } | UploadError::PresetsExhausted { .. } => {
                FailureClass::Configuration
            }
            UploadError::TransientNetwork(_) | UploadError::Timeout(_) => FailureClass::Network,
            UploadError::Payload(_) => FailureClass::Payload,
        }
    }
}

/// Recording a finished upload with the persistence collaborator failed.
/// The remote media still exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Misuse of the image set API. These fail loudly instead of being ignored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageSetError {
    #[error("no image with id {0} in this set")]
    UnknownImage(ImageId),

    #[error("new order must list every image exactly once ({expected} images, got {actual} ids)")]
    InvalidOrder { expected: usize, actual: usize },

    #[error("image {id} cannot be retried: {reason}")]
    NotRetryable { id: ImageId, reason: String },
}

/// Settings that cannot drive a working pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pipeline setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_classes() {
        assert_eq!(
            UploadError::Timeout(Duration::from_secs(30)).class(),
            FailureClass::Network
        );
        assert_eq!(
            UploadError::TransientNetwork("reset".into()).class(),
            FailureClass::Network
        );
        assert_eq!(
            UploadError::PresetsExhausted {
                presets: vec!["a".into()]
            }
            .class(),
            FailureClass::Configuration
        );
        assert_eq!(
            UploadError::Payload("too big".into()).class(),
            FailureClass::Payload
        );
    }

    #[test]
    fn test_presets_exhausted_names_all_presets() {
        let err = UploadError::PresetsExhausted {
            presets: vec!["listing_unsigned".into(), "ml_default".into()],
        };
        assert_eq!(
            err.to_string(),
            "every upload preset was rejected (tried: listing_unsigned, ml_default)"
        );
    }
}
