use photo_upload::{ConfigError, ImageSetError};

/// Central error type for the listing-photos app
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    /// Settings file could not be parsed
    #[error("Invalid settings: {0}")]
    Settings(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    ImageSet(#[from] ImageSetError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Settings(e.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(e: toml::ser::Error) -> Self {
        AppError::Settings(e.to_string())
    }
}

/// User-friendly error messages for terminal output
impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred. Please try again.".to_string(),
            AppError::Filesystem(_) => {
                "Error accessing files. Please check the paths and permissions.".to_string()
            }
            AppError::Settings(msg) => format!("The settings file is invalid: {}", msg),
            AppError::Config(e) => format!("The upload settings are unusable: {}", e),
            AppError::Serialization(_) => "Could not write the upload result.".to_string(),
            AppError::ImageSet(e) => e.to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("{} was not found.", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_errors_are_readable() {
        let err: AppError = toml::from_str::<toml::Table>("pipeline = [").unwrap_err().into();
        assert!(matches!(err, AppError::Settings(_)));
        assert!(err.user_message().starts_with("The settings file is invalid"));
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::NotFound("Photo kitchen.jpg".into());
        assert_eq!(err.user_message(), "Photo kitchen.jpg was not found.");
    }
}
