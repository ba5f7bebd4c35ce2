//! HEIC/HEIF conversion via an external converter binary.
//!
//! Shells out to `heif-convert` (configurable) the same way transcription
//! backends shell out to local tooling. The produced `.jpg` replaces the
//! container file; the source is removed once the raster sibling exists.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Settings;

use super::FormatConverter;

/// Converter for camera-proprietary container formats.
pub struct HeifConverter {
    binary_path: String,
    convert_extensions: Vec<String>,
}

impl HeifConverter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            binary_path: settings.converter_bin.clone(),
            convert_extensions: settings.convert_extensions.clone(),
        }
    }

    /// Converter with an explicit binary path.
    pub fn with_binary_path(binary_path: impl Into<String>, extensions: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            convert_extensions: extensions,
        }
    }
}

#[async_trait]
impl FormatConverter for HeifConverter {
    fn needs_conversion(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.convert_extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    async fn convert(&self, path: &Path) -> Result<PathBuf> {
        let target = path.with_extension("jpg");

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            anyhow::bail!(
                "Conversion target already exists: {}",
                target.display()
            );
        }

        let output = Command::new(&self.binary_path)
            .arg(path)
            .arg(&target)
            .output()
            .await
            .with_context(|| format!("Failed to run converter '{}'", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Converter failed with exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            anyhow::bail!("Converter produced no output at {}", target.display());
        }

        // The raster file replaces the container; drop the source so the
        // vault never carries both.
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove converted source: {}", path.display()))?;

        Ok(target)
    }
}
