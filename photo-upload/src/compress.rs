//! Downscaling and re-encoding before upload.
//!
//! Compression is an optimisation. If anything goes wrong the original bytes
//! are uploaded instead and the item carries on.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use tokio_util::sync::CancellationToken;

use crate::config::CompressionOptions;
use crate::error::CompressionError;
use crate::models::SourceFile;

/// Turns a picked file into the payload that is actually uploaded.
pub trait ImageCompressor: Send + Sync {
    /// Returns a new file with the same media type as the input.
    fn compress(
        &self,
        file: &SourceFile,
        options: &CompressionOptions,
    ) -> Result<SourceFile, CompressionError>;
}

/// Compressor backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCompressor;

impl ImageCompressor for RasterCompressor {
    fn compress(
        &self,
        file: &SourceFile,
        options: &CompressionOptions,
    ) -> Result<SourceFile, CompressionError> {
        let format = ImageFormat::from_mime_type(&file.media_type)
            .ok_or_else(|| CompressionError::UnsupportedFormat(file.media_type.clone()))?;

        // Decoding keeps only the first frame of an animation
        if format == ImageFormat::Gif {
            log::debug!("Leaving {} as is", file.file_name);
            return Ok(file.clone());
        }

        let img = image::load_from_memory_with_format(&file.data, format)
            .map_err(|e| CompressionError::Decode(e.to_string()))?;

        let (width, height) = calculate_resize_dimensions(
            img.width(),
            img.height(),
            options.max_width,
            options.max_height,
        );
        let resized = (width, height) != (img.width(), img.height());
        let img = if !resized {
            img
        } else {
            log::debug!(
                "Resizing {} from {}x{} to {}x{}",
                file.file_name,
                img.width(),
                img.height(),
                width,
                height
            );
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        let data = encode(&img, format, options.quality)?;
        if !resized && data.len() >= file.data.len() {
            log::debug!(
                "Re-encoding {} saved nothing, keeping original",
                file.file_name
            );
            return Ok(file.clone());
        }
        log::debug!(
            "Compressed {}: {} -> {} bytes",
            file.file_name,
            file.data.len(),
            data.len()
        );

        Ok(SourceFile {
            file_name: file.file_name.clone(),
            media_type: file.media_type.clone(),
            data: data.into(),
        })
    }
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, CompressionError> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)
                .map_err(|e| CompressionError::Encode(e.to_string()))?;
        }
        ImageFormat::Png | ImageFormat::WebP => {
            // Lossless encoders; only the resize reduces size
            img.write_to(&mut buffer, format)
                .map_err(|e| CompressionError::Encode(e.to_string()))?;
        }
        other => {
            return Err(CompressionError::UnsupportedFormat(format!("{:?}", other)));
        }
    }
    Ok(buffer.into_inner())
}

/// Scales (width, height) down to fit inside the bounds, keeping the aspect
/// ratio. Images that already fit are left alone.
pub fn calculate_resize_dimensions(
    original_width: u32,
    original_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    if original_width == 0 || original_height == 0 || max_width == 0 || max_height == 0 {
        return (original_width, original_height);
    }

    let ratio = (original_width as f64 / max_width as f64)
        .max(original_height as f64 / max_height as f64);

    if ratio > 1.0 {
        let new_width = ((original_width as f64 / ratio).round() as u32).clamp(1, max_width);
        let new_height = ((original_height as f64 / ratio).round() as u32).clamp(1, max_height);
        (new_width, new_height)
    } else {
        (original_width, original_height)
    }
}

/// Runs the compressor on the blocking pool, falling back to the original
/// file on any error.
///
/// Returns `None` once `cancel` fires. A job that has not started yet drops
/// its copy of the file without decoding it. A job already decoding runs to
/// completion on the blocking pool, so its buffers are freed only when it
/// finishes.
pub async fn compress_in_background(
    compressor: Arc<dyn ImageCompressor>,
    file: SourceFile,
    options: CompressionOptions,
    cancel: &CancellationToken,
) -> Option<SourceFile> {
    let file_name = file.file_name.clone();
    let original = file.clone();
    let token = cancel.clone();
    let job = tokio::task::spawn_blocking(move || {
        if token.is_cancelled() {
            return None;
        }
        Some(compressor.compress(&file, &options))
    });

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            log::debug!("Compression of {} cancelled", file_name);
            return None;
        }
        joined = job => match joined {
            Ok(Some(result)) => result,
            Ok(None) => return None,
            Err(e) => Err(CompressionError::TaskFailed(e.to_string())),
        },
    };

    match result {
        Ok(compressed) => Some(compressed),
        Err(e) => {
            log::warn!(
                "Compression of {} failed, uploading original: {}",
                file_name,
                e
            );
            Some(original)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifDecoder, GifEncoder};
    use image::{AnimationDecoder, Frame, ImageBuffer, Rgb, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_resize_dimensions() {
        // Image larger than max
        let (w, h) = calculate_resize_dimensions(2000, 1500, 1024, 1024);
        assert_eq!((w, h), (1024, 768));

        // Image smaller than max
        let (w, h) = calculate_resize_dimensions(800, 600, 1024, 1024);
        assert_eq!((w, h), (800, 600));

        // Portrait bound by height
        let (w, h) = calculate_resize_dimensions(3000, 4000, 1920, 1080);
        assert!(w <= 1920 && h <= 1080);
        assert_eq!(h, 1080);
    }

    #[test]
    fn test_compress_downscales_jpeg() {
        let file = SourceFile::new("facade.jpg", "image/jpeg", jpeg_bytes(400, 200));
        let options = CompressionOptions {
            max_width: 100,
            max_height: 100,
            quality: 70,
        };

        let out = RasterCompressor.compress(&file, &options).unwrap();
        assert_eq!(out.media_type, "image/jpeg");
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let file = SourceFile::new("broken.jpg", "image/jpeg", vec![0xFFu8, 0xD8, 0x00, 0x01]);
        let result = RasterCompressor.compress(&file, &CompressionOptions::default());
        assert!(matches!(result, Err(CompressionError::Decode(_))));
    }

    #[tokio::test]
    async fn test_background_compression_passes_corrupt_file_through() {
        let file = SourceFile::new("broken.jpg", "image/jpeg", vec![1u8, 2, 3, 4]);
        let out = compress_in_background(
            Arc::new(RasterCompressor),
            file.clone(),
            CompressionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(out, Some(file));
    }

    struct CountingCompressor(AtomicUsize);

    impl ImageCompressor for CountingCompressor {
        fn compress(
            &self,
            file: &SourceFile,
            _options: &CompressionOptions,
        ) -> Result<SourceFile, CompressionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(file.clone())
        }
    }

    #[tokio::test]
    async fn test_cancelled_job_never_decodes() {
        let compressor = Arc::new(CountingCompressor(AtomicUsize::new(0)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = compress_in_background(
            compressor.clone(),
            SourceFile::new("porch.jpg", "image/jpeg", vec![5u8; 64]),
            CompressionOptions::default(),
            &cancel,
        )
        .await;

        assert_eq!(out, None);
        // Give a job that might still be queued time to run
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(compressor.0.load(Ordering::SeqCst), 0);
    }

    fn animated_gif() -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buffer);
            let frames = [Rgba([255u8, 0, 0, 255]), Rgba([0u8, 0, 255, 255])]
                .into_iter()
                .map(|color| Frame::new(RgbaImage::from_pixel(8, 8, color)));
            encoder.encode_frames(frames).unwrap();
        }
        buffer
    }

    #[test]
    fn test_animated_gif_keeps_every_frame() {
        let data = animated_gif();
        let file = SourceFile::new("tour.gif", "image/gif", data.clone());

        let out = RasterCompressor
            .compress(&file, &CompressionOptions::default())
            .unwrap();
        assert_eq!(&*out.data, &data[..]);

        let frames = GifDecoder::new(Cursor::new(&out.data[..]))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_small_png_is_not_inflated() {
        let img = ImageBuffer::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 0]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        let data = buffer.into_inner();
        let file = SourceFile::new("plan.png", "image/png", data.clone());

        let out = RasterCompressor
            .compress(&file, &CompressionOptions::default())
            .unwrap();
        assert!(out.data.len() <= data.len());
        assert_eq!(&*out.data, &data[..]);
    }
}
