//! Markdown note writer.
//!
//! Notes are named after the image stem; when that name is taken the writer
//! counts up (`a.md`, `a-1.md`, `a-2.md`, ...) until a free slot is found.
//! The body embeds the image wiki-style and carries the transcription below
//! a small frontmatter block.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::storage::Storage;

use super::NoteMaterializer;

pub struct MarkdownMaterializer {
    storage: Arc<dyn Storage>,
}

impl MarkdownMaterializer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn unique_note_path(&self, note_dir: &Path, stem: &str) -> Result<PathBuf> {
        let mut candidate = note_dir.join(format!("{stem}.md"));
        let mut counter = 1u32;

        while self.storage.exists(&candidate).await {
            candidate = note_dir.join(format!("{stem}-{counter}.md"));
            counter += 1;
            if counter > 10_000 {
                anyhow::bail!("Could not find a free note name for '{stem}'");
            }
        }

        Ok(candidate)
    }
}

#[async_trait]
impl NoteMaterializer for MarkdownMaterializer {
    async fn create_note(&self, text: &str, image: &Path, note_dir: &Path) -> Result<PathBuf> {
        let image_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.display().to_string());
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let path = self.unique_note_path(note_dir, &stem).await?;
        let content = render_note(text, &image_name);

        self.storage.write_note(&path, &content).await
    }
}

fn render_note(text: &str, image_name: &str) -> String {
    format!(
        "---\ncreated: {}\nsource: \"[[{}]]\"\n---\n\n![[{}]]\n\n{}\n",
        Utc::now().format("%Y-%m-%d %H:%M"),
        image_name,
        image_name,
        text.trim()
    )
}
