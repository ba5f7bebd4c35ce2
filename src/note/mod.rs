//! Note materialization: turning a transcription into a vault note.

pub mod markdown;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

pub use markdown::MarkdownMaterializer;

/// Writes a uniquely-named note for a transcribed image.
#[async_trait]
pub trait NoteMaterializer: Send + Sync {
    /// Create the note and return its path. Must never overwrite an
    /// existing note; naming conflicts are resolved by the implementation.
    async fn create_note(&self, text: &str, image: &Path, note_dir: &Path) -> Result<PathBuf>;
}
