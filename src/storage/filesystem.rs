//! Local filesystem storage backed by tokio::fs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use super::Storage;

/// Real filesystem implementation of [`Storage`].
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_folder(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create folder: {}", path.display()))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.with_context(|| {
            format!("Failed to move {} to {}", from.display(), to.display())
        })
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))
    }

    async fn write_note(&self, path: &Path, content: &str) -> Result<PathBuf> {
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write note: {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}
