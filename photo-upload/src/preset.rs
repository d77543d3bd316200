//! Upload with preset fallback.
//!
//! Presets are tried in priority order. Only a configuration failure moves on
//! to the next preset; network and payload failures are returned at once,
//! since a different preset cannot fix either.

use std::sync::Arc;
use std::time::Duration;

use crate::error::UploadError;
use crate::models::{RemoteDescriptor, SourceFile};
use crate::transport::{ProgressCallback, UploadTransport};

#[derive(Clone)]
pub struct PresetResolver {
    transport: Arc<dyn UploadTransport>,
    candidates: Vec<String>,
    attempt_timeout: Duration,
}

impl PresetResolver {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        candidates: Vec<String>,
        attempt_timeout: Duration,
    ) -> Self {
        let candidates = candidates
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            transport,
            candidates,
            attempt_timeout,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Uploads `file`, falling back through the configured presets.
    ///
    /// Each transport call is bounded by the attempt timeout; running out of
    /// time is reported as `UploadError::Timeout`.
    pub async fn upload_with_fallback(
        &self,
        file: &SourceFile,
        on_progress: ProgressCallback,
    ) -> Result<RemoteDescriptor, UploadError> {
        let mut attempted = Vec::with_capacity(self.candidates.len());

        for preset in &self.candidates {
            let attempt = self.transport.upload(file, preset, on_progress.clone());
            let result = match tokio::time::timeout(self.attempt_timeout, attempt).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!(
                        "Upload of {} with preset {} timed out after {:?}",
                        file.file_name,
                        preset,
                        self.attempt_timeout
                    );
                    return Err(UploadError::Timeout(self.attempt_timeout));
                }
            };

            match result {
                Ok(descriptor) => {
                    log::info!(
                        "Uploaded {} with preset {} as {}",
                        file.file_name,
                        preset,
                        descriptor.remote_id
                    );
                    return Ok(descriptor);
                }
                Err(UploadError::Configuration { message, .. }) => {
                    log::warn!(
                        "Preset {} rejected for {}: {}. Trying next preset",
                        preset,
                        file.file_name,
                        message
                    );
                    attempted.push(preset.clone());
                }
                Err(e) => return Err(e),
            }
        }

        log::error!(
            "No upload preset accepted {} (tried: {})",
            file.file_name,
            attempted.join(", ")
        );
        Err(UploadError::PresetsExhausted { presets: attempted })
    }
}
