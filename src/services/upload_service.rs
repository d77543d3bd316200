use std::path::PathBuf;
use std::sync::Arc;

use photo_upload::{
    BatchSummary, FinalImage, ImageId, ImageSetManager, ItemFailure, OwnerContext, PipelineConfig,
    ResultSink, SourceFile, UploadTransport,
};
use serde::Serialize;

use crate::error::AppError;

/// A picked file that was never registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub file_name: String,
    pub reason: String,
}

/// Result of one `upload` run, printed as JSON
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub rejected: Vec<RejectedFile>,
    pub summary: BatchSummary,
    pub final_images: Vec<FinalImage>,
}

/// Reads the picked files from disk
pub fn load_source_files(paths: &[PathBuf]) -> Result<Vec<SourceFile>, AppError> {
    paths
        .iter()
        .map(|path| {
            SourceFile::from_path(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AppError::NotFound(format!("Photo {}", path.display()))
                }
                _ => AppError::Filesystem(e),
            })
        })
        .collect()
}

pub fn build_manager(
    pipeline: PipelineConfig,
    transport: Arc<dyn UploadTransport>,
    sink: Arc<dyn ResultSink>,
    owner: OwnerContext,
) -> Result<ImageSetManager, AppError> {
    Ok(ImageSetManager::builder(pipeline, transport)
        .sink(sink, owner)
        .build()?)
}

/// Registers `files`, waits for every upload to settle and retries
/// retryable failures for up to `retry_rounds` rounds.
///
/// `cover` selects the cover by position among the accepted files.
pub async fn upload_batch(
    manager: &ImageSetManager,
    files: Vec<SourceFile>,
    cover: Option<usize>,
    retry_rounds: u32,
) -> Result<UploadOutcome, AppError> {
    let report = manager.register_files(files);

    if let Some(position) = cover {
        let id = report.accepted.get(position).ok_or_else(|| {
            AppError::Validation(format!(
                "Cover position {} is out of range ({} photos accepted)",
                position,
                report.accepted.len()
            ))
        })?;
        manager.set_cover(*id)?;
    }

    let mut summary = manager.settled().await;
    for round in 1..=retry_rounds {
        let retryable: Vec<ImageId> = summary
            .items
            .iter()
            .filter(|i| i.failure().is_some_and(ItemFailure::is_retryable))
            .map(|i| i.id)
            .collect();
        if retryable.is_empty() {
            break;
        }

        log::info!("Retry round {}: {} photos", round, retryable.len());
        for id in retryable {
            manager.retry(id)?;
        }
        summary = manager.settled().await;
    }

    Ok(UploadOutcome {
        rejected: report
            .rejected
            .iter()
            .map(|e| RejectedFile {
                file_name: e.file_name().to_string(),
                reason: e.to_string(),
            })
            .collect(),
        final_images: manager.final_descriptors(),
        summary,
    })
}
