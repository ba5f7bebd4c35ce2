//! Storage abstraction for the pipeline.
//!
//! The pipeline never touches the filesystem directly; everything goes
//! through this trait so tests can substitute fakes and failures.

pub mod filesystem;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

pub use filesystem::FsStorage;

/// Filesystem surface consumed by the pipeline stages.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether a file or folder exists at `path`.
    async fn exists(&self, path: &Path) -> bool;

    /// Ensure a folder (and its parents) exists.
    async fn create_folder(&self, path: &Path) -> Result<()>;

    /// Relocate a file. `to`'s parent must already exist.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Read a file's full contents.
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write a note file and return its path.
    async fn write_note(&self, path: &Path, content: &str) -> Result<PathBuf>;
}
