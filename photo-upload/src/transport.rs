//! Network transfer of a single file to the media host.
//!
//! The HTTP implementation posts a multipart form with the file and the
//! preset name. The body is streamed in chunks so progress can be reported
//! while the request is being sent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::UploadError;
use crate::models::{RemoteDescriptor, SourceFile};

/// Receives upload progress in percent.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Performs one upload attempt with one preset.
///
/// Implementations report progress through `on_progress` and may only
/// report 100 once the host has confirmed the upload. Cancellation happens
/// by dropping the returned future.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(
        &self,
        file: &SourceFile,
        preset: &str,
        on_progress: ProgressCallback,
    ) -> Result<RemoteDescriptor, UploadError>;
}

#[cfg(feature = "http")]
pub use http::{classify_failure, HttpTransport, MediaHostConfig};

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use reqwest::multipart::{Form, Part};
    use reqwest::StatusCode;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::ConfigError;

    const CHUNK_SIZE: usize = 64 * 1024;

    /// Where and how to reach the media host
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct MediaHostConfig {
        pub upload_url: String,
        /// Name of the form field carrying the preset
        pub preset_field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub folder: Option<String>,
        pub connect_timeout_ms: u64,
    }

    impl Default for MediaHostConfig {
        fn default() -> Self {
            Self {
                upload_url: String::new(),
                preset_field: "upload_preset".to_string(),
                folder: None,
                connect_timeout_ms: 10_000,
            }
        }
    }

    impl MediaHostConfig {
        /// Unsigned image uploads to a Cloudinary cloud
        pub fn cloudinary(cloud_name: &str) -> Self {
            Self {
                upload_url: format!("https://api.cloudinary.com/v1_1/{}/image/upload", cloud_name),
                ..Self::default()
            }
        }
    }

    #[derive(Debug, Deserialize)]
    struct UploadResponse {
        secure_url: String,
        public_id: String,
        width: u32,
        height: u32,
        bytes: u64,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Deserialize)]
    struct ErrorResponse {
        error: ErrorBody,
    }

    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        message: String,
    }

    /// Multipart upload over `reqwest`.
    pub struct HttpTransport {
        client: reqwest::Client,
        config: MediaHostConfig,
    }

    impl HttpTransport {
        pub fn new(config: MediaHostConfig) -> Result<Self, ConfigError> {
            if config.upload_url.trim().is_empty() {
                return Err(ConfigError::invalid("upload_url", "media host URL is required"));
            }
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_millis(config.connect_timeout_ms.max(1)))
                .build()
                .map_err(|e| ConfigError::invalid("media_host", e.to_string()))?;
            Ok(Self { client, config })
        }

        fn build_form(
            &self,
            file: &SourceFile,
            preset: &str,
            on_progress: ProgressCallback,
        ) -> Result<Form, UploadError> {
            let total = file.data.len() as u64;
            let data = file.data.clone();
            let mut sent = 0u64;
            let mut last_reported = 0u8;

            let chunks = (0..data.len()).step_by(CHUNK_SIZE).map(move |start| {
                let end = (start + CHUNK_SIZE).min(data.len());
                sent += (end - start) as u64;
                // 100 is reserved for the confirmed response
                let percent = ((sent * 99) / total.max(1)) as u8;
                if percent > last_reported {
                    last_reported = percent;
                    on_progress(percent);
                }
                Ok::<Vec<u8>, std::io::Error>(data[start..end].to_vec())
            });
            let body = reqwest::Body::wrap_stream(futures_util::stream::iter(chunks));

            let part = Part::stream_with_length(body, total)
                .file_name(file.file_name.clone())
                .mime_str(&file.media_type)
                .map_err(|e| UploadError::Payload(format!("invalid media type: {}", e)))?;

            let mut form = Form::new()
                .part("file", part)
                .text(self.config.preset_field.clone(), preset.to_string());
            if let Some(folder) = &self.config.folder {
                form = form.text("folder", folder.clone());
            }
            Ok(form)
        }
    }

    #[async_trait]
    impl UploadTransport for HttpTransport {
        async fn upload(
            &self,
            file: &SourceFile,
            preset: &str,
            on_progress: ProgressCallback,
        ) -> Result<RemoteDescriptor, UploadError> {
            let form = self.build_form(file, preset, on_progress.clone())?;

            log::debug!(
                "POST {} ({} bytes, preset {})",
                self.config.upload_url,
                file.data.len(),
                preset
            );
            let resp = self
                .client
                .post(&self.config.upload_url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| UploadError::TransientNetwork(e.to_string()))?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| UploadError::TransientNetwork(e.to_string()))?;

            if !status.is_success() {
                return Err(classify_failure(status, &body, preset));
            }

            let parsed: UploadResponse = serde_json::from_str(&body).map_err(|e| {
                UploadError::TransientNetwork(format!("unexpected response from media host: {}", e))
            })?;
            on_progress(100);

            Ok(RemoteDescriptor {
                url: parsed.secure_url,
                remote_id: parsed.public_id,
                width: parsed.width,
                height: parsed.height,
                byte_size: parsed.bytes,
                format: parsed.format,
                created_at: parsed.created_at,
            })
        }
    }

    /// Maps a non-success response to a failure class.
    ///
    /// Authorization failures and messages about presets or credentials are
    /// configuration problems; throttling and server errors are transient;
    /// the remaining client errors concern the file itself.
    pub fn classify_failure(status: StatusCode, body: &str, preset: &str) -> UploadError {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status.to_string()
                } else {
                    trimmed.chars().take(200).collect()
                }
            });

        let lowered = message.to_ascii_lowercase();
        let mentions_config = ["preset", "unsigned", "api_key", "cloud_name", "unauthorized"]
            .iter()
            .any(|needle| lowered.contains(needle));

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::Configuration {
                preset: preset.to_string(),
                message,
            },
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                UploadError::TransientNetwork(format!("{}: {}", status, message))
            }
            s if s.is_server_error() => {
                UploadError::TransientNetwork(format!("{}: {}", status, message))
            }
            s if s.is_client_error() && mentions_config => UploadError::Configuration {
                preset: preset.to_string(),
                message,
            },
            _ => UploadError::Payload(message),
        }
    }

}
