//! Processed-history store.
//!
//! A durable set of canonical final paths that have completed the full
//! pipeline. Membership is checked before the expensive transcription stage
//! and appended only after note creation succeeds; it is the single source
//! of truth for "already transcribed" and must survive restarts.
//!
//! Persistence is one path per line, appended and synced before `add`
//! returns. A missing or unreadable file loads as an empty set, never as an
//! error.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::PathKey;

pub struct ProcessedHistory {
    path: PathBuf,
    entries: Mutex<HashSet<String>>,
}

impl ProcessedHistory {
    /// Load the history file. Missing or malformed content yields an empty
    /// history rather than a failure.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut entries = HashSet::new();

        match fs::read_to_string(&path).await {
            Ok(content) => {
                for line in content.lines() {
                    let line = line.trim();
                    if !line.is_empty() {
                        entries.insert(line.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not read history file, starting empty"
                );
            }
        }

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Whether a canonical final path has already been transcribed.
    pub async fn contains(&self, key: &PathKey) -> bool {
        self.entries.lock().await.contains(key.as_str())
    }

    /// Record a canonical final path. Set semantics: re-adding is a no-op.
    /// The entry is appended and synced before this returns, so the
    /// in-memory and persisted views cannot diverge across a crash.
    pub async fn add(&self, key: &PathKey) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if !entries.insert(key.as_str().to_string()) {
            return Ok(());
        }

        if let Err(e) = self.append_line(key.as_str()).await {
            entries.remove(key.as_str());
            return Err(e);
        }

        Ok(())
    }

    /// Administrative reset: forget everything and truncate the file.
    /// In-flight jobs are not cancelled.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, b"")
            .await
            .with_context(|| format!("Failed to truncate history: {}", self.path.display()))?;

        entries.clear();
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Sorted snapshot of all entries.
    pub async fn entries(&self) -> Vec<String> {
        let mut all: Vec<String> = self.entries.lock().await.iter().cloned().collect();
        all.sort();
        all
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open history: {}", self.path.display()))?;

        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .context("Failed to append history entry")?;
        file.flush().await.context("Failed to flush history")?;
        file.sync_data().await.context("Failed to sync history")?;

        Ok(())
    }
}
