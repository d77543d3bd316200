use crate::config::PipelineConfig;
use crate::error::ValidationError;
use crate::models::SourceFile;

/// Checks media type and size before a file is registered.
///
/// The byte ceiling is a parameter because profile pictures and listing
/// galleries use different limits.
#[derive(Debug, Clone)]
pub struct FileValidator {
    allowed_media_types: Vec<String>,
    max_file_bytes: u64,
}

impl FileValidator {
    pub fn new(allowed_media_types: Vec<String>, max_file_bytes: u64) -> Self {
        Self {
            allowed_media_types: allowed_media_types
                .into_iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            max_file_bytes,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.allowed_media_types.clone(), config.max_file_bytes)
    }

    pub fn validate(&self, file: &SourceFile) -> Result<(), ValidationError> {
        let media_type = file.media_type.trim().to_ascii_lowercase();
        if !self.allowed_media_types.iter().any(|t| *t == media_type) {
            return Err(ValidationError::UnsupportedType {
                file_name: file.file_name.clone(),
                media_type: file.media_type.clone(),
            });
        }

        let size = file.byte_size();
        if size == 0 {
            return Err(ValidationError::EmptyFile {
                file_name: file.file_name.clone(),
            });
        }
        if size > self.max_file_bytes {
            return Err(ValidationError::TooLarge {
                file_name: file.file_name.clone(),
                size,
                max: self.max_file_bytes,
            });
        }

        Ok(())
    }
}
