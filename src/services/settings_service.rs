use std::path::Path;

use photo_upload::{MediaHostConfig, PipelineConfig};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{AppSettings, DatabaseSettings, PipelineProfile};

/// `[pipeline]` as written: a base profile plus overrides on top of it
#[derive(Debug, Default, Deserialize)]
struct PipelineSection {
    #[serde(default)]
    profile: PipelineProfile,
    #[serde(flatten)]
    overrides: toml::Table,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    media_host: MediaHostConfig,
    pipeline: PipelineSection,
    database: DatabaseSettings,
}

/// Loads the application settings from a TOML file
pub fn load_settings(path: &Path) -> Result<AppSettings, AppError> {
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "Settings file {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let settings = parse_settings(&text)?;
    log::info!(
        "Loaded settings from {} ({:?} profile, {} presets)",
        path.display(),
        settings.profile,
        settings.pipeline.preset_candidates.len()
    );
    Ok(settings)
}

pub fn parse_settings(text: &str) -> Result<AppSettings, AppError> {
    let file: SettingsFile = toml::from_str(text)?;
    let profile = file.pipeline.profile;
    let pipeline = resolve_pipeline(profile, file.pipeline.overrides)?;
    pipeline.validate()?;

    Ok(AppSettings {
        media_host: file.media_host,
        profile,
        pipeline,
        database: file.database,
    })
}

/// Applies the overrides on top of the profile's defaults.
fn resolve_pipeline(
    profile: PipelineProfile,
    overrides: toml::Table,
) -> Result<PipelineConfig, AppError> {
    let mut base = match toml::Value::try_from(profile.base_config())? {
        toml::Value::Table(table) => table,
        _ => return Err(AppError::Settings("pipeline must be a table".to_string())),
    };
    merge_tables(&mut base, overrides);
    Ok(toml::Value::Table(base).try_into()?)
}

/// Nested tables merge key by key; everything else replaces.
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
