//! Pipeline configuration.
//!
//! Every limit the pipeline enforces lives here and is handed to the manager
//! at construction time. Two profiles cover the places photos are picked:
//! listing galleries and profile pictures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const MIB: u64 = 1024 * 1024;

/// Bounds used when re-encoding an image before upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality 1-100 (lossy formats only)
    pub quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 80,
        }
    }
}

/// Automatic retry of network-class failures, applied before an item is
/// marked failed. Disabled when `max_retries` is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for AutoRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_files: usize,
    pub max_file_bytes: u64,
    pub allowed_media_types: Vec<String>,
    pub compression: CompressionOptions,
    /// Upload presets in priority order
    pub preset_candidates: Vec<String>,
    pub attempt_timeout_ms: u64,
    /// Upper bound on items compressing or uploading at once; `None` is unbounded
    pub max_concurrent_uploads: Option<usize>,
    pub auto_retry: AutoRetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::listing_gallery()
    }
}

impl PipelineConfig {
    /// Photos attached to a rental listing
    pub fn listing_gallery() -> Self {
        Self {
            max_files: 10,
            max_file_bytes: 15 * MIB,
            allowed_media_types: default_media_types(),
            compression: CompressionOptions::default(),
            preset_candidates: vec!["listing_photos".to_string(), "ml_default".to_string()],
            attempt_timeout_ms: 60_000,
            max_concurrent_uploads: Some(3),
            auto_retry: AutoRetryPolicy::default(),
        }
    }

    /// A single profile picture
    pub fn profile_image() -> Self {
        Self {
            max_files: 1,
            max_file_bytes: 5 * MIB,
            allowed_media_types: default_media_types(),
            compression: CompressionOptions {
                max_width: 512,
                max_height: 512,
                quality: 85,
            },
            preset_candidates: vec!["profile_pictures".to_string(), "ml_default".to_string()],
            attempt_timeout_ms: 30_000,
            max_concurrent_uploads: Some(1),
            auto_retry: AutoRetryPolicy::default(),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_files == 0 {
            return Err(ConfigError::invalid("max_files", "must be at least 1"));
        }
        if self.max_file_bytes == 0 {
            return Err(ConfigError::invalid("max_file_bytes", "must be at least 1"));
        }
        if self.allowed_media_types.is_empty() {
            return Err(ConfigError::invalid(
                "allowed_media_types",
                "at least one media type is required",
            ));
        }
        if self.preset_candidates.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "preset_candidates",
                "at least one upload preset is required",
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "attempt_timeout_ms",
                "uploads need a finite, non-zero timeout",
            ));
        }
        if !(1..=100).contains(&self.compression.quality) {
            return Err(ConfigError::invalid(
                "compression.quality",
                format!("{} is outside 1-100", self.compression.quality),
            ));
        }
        if self.compression.max_width == 0 || self.compression.max_height == 0 {
            return Err(ConfigError::invalid(
                "compression",
                "maximum dimensions must be non-zero",
            ));
        }
        if self.max_concurrent_uploads == Some(0) {
            return Err(ConfigError::invalid(
                "max_concurrent_uploads",
                "use no value for unbounded, not zero",
            ));
        }
        Ok(())
    }
}

fn default_media_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/webp", "image/gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_valid() {
        assert!(PipelineConfig::listing_gallery().validate().is_ok());
        assert!(PipelineConfig::profile_image().validate().is_ok());
    }

    #[test]
    fn test_profile_ceiling_is_smaller() {
        assert_eq!(PipelineConfig::profile_image().max_file_bytes, 5 * MIB);
        assert_eq!(PipelineConfig::listing_gallery().max_file_bytes, 15 * MIB);
    }

    #[test]
    fn test_rejects_missing_presets() {
        let config = PipelineConfig {
            preset_candidates: vec![],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "preset_candidates",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_timeout_and_bad_quality() {
        let config = PipelineConfig {
            attempt_timeout_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.compression.quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PipelineConfig = from_json(r#"{"max_files": 4}"#);
        assert_eq!(config.max_files, 4);
        assert_eq!(config.max_file_bytes, 15 * MIB);
        assert_eq!(config.compression.quality, 80);
    }

    fn from_json(s: &str) -> PipelineConfig {
        serde_json::from_str(s).unwrap()
    }
}
