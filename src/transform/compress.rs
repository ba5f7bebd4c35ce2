//! In-place JPEG recompression.
//!
//! Downscales to the configured longest edge and re-encodes at the
//! configured quality. The rewrite goes through a tempfile in the same
//! directory and is renamed over the original, so a crash mid-write never
//! leaves a truncated image. If the re-encode would grow the file the
//! original is kept.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::config::CompressionOptions;

use super::Compressor;

/// Lossy compressor for already-raster images. Only JPEG content is
/// rewritten; other formats pass through untouched so the file's format
/// identity never changes under its path.
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor;

impl ImageCompressor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compressor for ImageCompressor {
    async fn compress(&self, path: &Path, options: &CompressionOptions) -> Result<()> {
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
            .unwrap_or(false);
        if !is_jpeg {
            return Ok(());
        }

        let len = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        if len < options.min_bytes {
            return Ok(());
        }

        let path = path.to_path_buf();
        let options = *options;
        tokio::task::spawn_blocking(move || compress_blocking(&path, &options))
            .await
            .context("Compression task panicked")?
    }
}

fn compress_blocking(path: &Path, options: &CompressionOptions) -> Result<()> {
    let original_len = std::fs::metadata(path)?.len();

    let img = image::open(path)
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;

    let img = if img.width().max(img.height()) > options.max_dimension {
        img.resize(
            options.max_dimension,
            options.max_dimension,
            FilterType::Lanczos3,
        )
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let dir = path
        .parent()
        .context("Image file has no parent directory")?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".pixnote-")
        .suffix(".jpg")
        .tempfile_in(dir)
        .context("Failed to create temp file for recompression")?;

    {
        let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
        let encoder = JpegEncoder::new_with_quality(&mut writer, options.jpeg_quality);
        rgb.write_with_encoder(encoder)
            .context("Failed to encode JPEG")?;
        writer.flush().context("Failed to flush recompressed JPEG")?;
    }

    let new_len = tmp.as_file().metadata()?.len();
    if new_len >= original_len {
        return Ok(());
    }

    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("Failed to replace {}: {}", path.display(), e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_test_jpeg(path: &Path, width: u32, height: u32) {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        image::DynamicImage::ImageRgb8(img)
            .save_with_format(path, image::ImageFormat::Jpeg)
            .unwrap();
    }

    #[tokio::test]
    async fn test_small_files_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("small.jpg");
        write_test_jpeg(&path, 32, 32);
        let before = std::fs::read(&path).unwrap();

        let options = CompressionOptions {
            min_bytes: 1024 * 1024,
            ..Default::default()
        };
        ImageCompressor::new().compress(&path, &options).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_non_jpeg_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.png");
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb([1, 2, 3]));
        image::DynamicImage::ImageRgb8(img)
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        ImageCompressor::new()
            .compress(&path, &CompressionOptions::default())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_large_jpeg_downscaled() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.jpg");
        write_test_jpeg(&path, 800, 600);

        let options = CompressionOptions {
            max_dimension: 200,
            jpeg_quality: 60,
            min_bytes: 0,
        };
        ImageCompressor::new().compress(&path, &options).await.unwrap();

        let img = image::open(&path).unwrap();
        assert!(img.width() <= 200 && img.height() <= 200);
    }

    #[tokio::test]
    async fn test_garbage_jpeg_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.jpg");
        std::fs::write(&path, vec![0u8; 200_000]).unwrap();

        let options = CompressionOptions {
            min_bytes: 0,
            ..Default::default()
        };
        assert!(ImageCompressor::new()
            .compress(&path, &options)
            .await
            .is_err());
        // Original left in place
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 200_000);
    }
}
