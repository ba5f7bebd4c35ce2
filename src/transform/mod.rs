//! Transform-stage collaborators: format normalization and size reduction.
//!
//! Both are consumed by the pipeline as black-box operations on a working
//! file. Conversion failure is terminal for a job; compression failure is
//! not — the pipeline continues with the uncompressed file.

pub mod compress;
pub mod convert;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::config::CompressionOptions;

pub use compress::ImageCompressor;
pub use convert::HeifConverter;

/// Turns a non-embeddable container format into a standard raster file.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Whether this file's format requires conversion at all.
    fn needs_conversion(&self, path: &Path) -> bool;

    /// Convert the file, returning the raster file that replaces it.
    async fn convert(&self, path: &Path) -> Result<PathBuf>;
}

/// Reduces a raster file's size in place, keeping the same path.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, path: &Path, options: &CompressionOptions) -> Result<()>;
}
