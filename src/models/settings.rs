use std::path::PathBuf;

use photo_upload::{MediaHostConfig, PipelineConfig};
use serde::{Deserialize, Serialize};

/// Named base for the `[pipeline]` section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineProfile {
    #[default]
    Listing,
    Profile,
}

impl PipelineProfile {
    pub fn base_config(self) -> PipelineConfig {
        match self {
            PipelineProfile::Listing => PipelineConfig::listing_gallery(),
            PipelineProfile::Profile => PipelineConfig::profile_image(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/listing-photos.db"),
        }
    }
}

/// Fully resolved application settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSettings {
    pub media_host: MediaHostConfig,
    pub profile: PipelineProfile,
    pub pipeline: PipelineConfig,
    pub database: DatabaseSettings,
}
