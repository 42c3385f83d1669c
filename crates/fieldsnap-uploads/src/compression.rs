//! Compression stage
//!
//! Turns one local photo into a smaller JPEG before it is transferred. Decoding
//! and re-encoding are CPU-bound, so [`ImageCompressor`] runs them on the
//! blocking pool. A failure here is never retried: a file that cannot be
//! decoded once will not decode on a second attempt.

use crate::config::CompressionConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output of the compression stage
#[derive(Debug, Clone)]
pub struct CompressedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, source: &Path) -> Result<CompressedFile>;
}

/// Downscales to `max_dimension` and re-encodes as JPEG
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor {
    config: CompressionConfig,
}

impl ImageCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    fn compress_blocking(path: &Path, config: &CompressionConfig) -> Result<CompressedFile> {
        let original = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let decoded = image::load_from_memory(&original)
            .with_context(|| format!("Unsupported or corrupt image: {}", path.display()))?;

        let resized = fit_within(decoded, config.max_dimension);
        let rgb = resized.to_rgb8();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, config.jpeg_quality)
            .encode_image(&rgb)
            .with_context(|| format!("Failed to encode {} as JPEG", path.display()))?;

        debug!(
            path = %path.display(),
            original_bytes = original.len(),
            compressed_bytes = bytes.len(),
            width = rgb.width(),
            height = rgb.height(),
            "Compressed image"
        );

        Ok(CompressedFile {
            bytes,
            content_type: mime::IMAGE_JPEG.to_string(),
        })
    }
}

fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_dimension {
        return image;
    }
    // resize() keeps the aspect ratio inside the bounding box
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

#[async_trait]
impl Compressor for ImageCompressor {
    async fn compress(&self, source: &Path) -> Result<CompressedFile> {
        let path: PathBuf = source.to_path_buf();
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || Self::compress_blocking(&path, &config))
            .await
            .context("Compression task panicked")?
    }
}

/// Uploads files as they are, typed by extension
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

#[async_trait]
impl Compressor for PassthroughCompressor {
    async fn compress(&self, source: &Path) -> Result<CompressedFile> {
        let bytes = tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read {}", source.display()))?;

        Ok(CompressedFile {
            bytes,
            content_type: fieldsnap_common::types::content_type_for_path(source).to_string(),
        })
    }
}
