//! # Photo Upload
//!
//! Manages the photos attached to a listing or profile while they are being
//! picked, compressed and uploaded to a hosted media service.
//!
//! This crate provides:
//! - Validation of picked files against type, size and count limits
//! - Background compression before upload
//! - Concurrent uploads with per-item progress and cancellation
//! - Fallback through a list of upload presets on configuration failures
//! - Cover photo tracking and ordering of the final image list
//! - Optional recording of finished uploads through a `ResultSink`
//!
//! The HTTP transport lives behind the default `http` feature.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use photo_upload::{HttpTransport, ImageSetManager, MediaHostConfig, PipelineConfig, SourceFile};
//!
//! let transport = HttpTransport::new(MediaHostConfig::cloudinary("demo"))?;
//! let manager = ImageSetManager::new(PipelineConfig::listing_gallery(), Arc::new(transport))?;
//!
//! manager.register_files(vec![SourceFile::from_path("kitchen.jpg".as_ref())?]);
//! let summary = manager.settled().await;
//! let images = manager.final_descriptors();
//! ```

pub mod compress;
pub mod config;
pub mod error;
mod image_set;
pub mod manager;
pub mod models;
pub mod preset;
pub mod presenter;
pub mod sink;
pub mod transport;
pub mod validator;

pub use compress::{calculate_resize_dimensions, ImageCompressor, RasterCompressor};
pub use config::{AutoRetryPolicy, CompressionOptions, PipelineConfig};
pub use error::{
    CompressionError, ConfigError, FailureClass, ImageSetError, PersistenceError, UploadError,
    ValidationError,
};
pub use manager::{ImageSetManager, ImageSetManagerBuilder, RegistrationReport, Subscription};
pub use models::{
    guess_media_type, BatchSummary, FinalImage, ImageId, ImageItem, ItemFailure, ItemState,
    OwnerContext, RecordStatus, RemoteDescriptor, SourceFile,
};
pub use preset::PresetResolver;
pub use presenter::{present, GalleryView, ItemView};
pub use sink::ResultSink;
pub use transport::{ProgressCallback, UploadTransport};
pub use validator::FileValidator;

#[cfg(feature = "http")]
pub use transport::{classify_failure, HttpTransport, MediaHostConfig};
