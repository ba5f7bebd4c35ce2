//! Vault file watcher.
//!
//! Watches the vault tree for new image files and hands them to the queue
//! once they are stable (downloads and camera imports arrive in chunks).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::core::ProcessingQueue;

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Vault directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Vault watcher with stability checking.
pub struct VaultWatcher {
    settings: Settings,
}

impl VaultWatcher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Check that the vault root exists.
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !self.settings.vault_root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(
                self.settings.vault_root.clone(),
            ));
        }
        Ok(())
    }

    /// Sweep the vault once and offer every image file to the queue.
    /// Hidden directories (`.pixnote`, `.obsidian`, ...) are skipped.
    pub async fn scan_vault(&self, queue: &ProcessingQueue) -> Result<ScanResult> {
        self.validate()?;

        let mut result = ScanResult::default();

        let walker = walkdir::WalkDir::new(&self.settings.vault_root)
            .follow_links(false)
            .into_iter()
            // depth 0 is the vault root itself, which may legitimately be
            // a dot-directory
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry during scan");
                    result.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !self.settings.is_watched_file(path) {
                continue;
            }

            if queue.enqueue(path).await {
                result.admitted += 1;
            } else {
                result.skipped += 1;
            }
        }

        Ok(result)
    }

    /// Watch the vault and admit new stable image files until stopped.
    pub async fn watch(&self, queue: ProcessingQueue) -> Result<WatchHandle> {
        self.validate()?;

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let settings = self.settings.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = run_watcher(settings, queue, &mut stop_rx).await {
                tracing::error!(error = %e, "Watcher error");
            }
        });

        Ok(WatchHandle { stop_tx, task })
    }
}

/// Handle to control the watcher.
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher and wait for its task to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

/// Result of a one-shot vault sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Files newly admitted to the queue
    pub admitted: usize,

    /// Files the queue declined (already queued, vanished, ...)
    pub skipped: usize,

    /// Directory entries that could not be read
    pub errors: usize,
}

impl ScanResult {
    pub fn total_seen(&self) -> usize {
        self.admitted + self.skipped
    }
}

/// Whether any path component is hidden (dot-prefixed).
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Internal watcher loop.
async fn run_watcher(
    settings: Settings,
    queue: ProcessingQueue,
    stop_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    // Track files being stabilized (path -> (size, last_seen))
    let mut pending: HashMap<PathBuf, (u64, Instant)> = HashMap::new();

    let (tx, rx) = std::sync::mpsc::channel();

    let mut debouncer = new_debouncer(Duration::from_secs(1), tx)?;
    debouncer
        .watcher()
        .watch(&settings.vault_root, RecursiveMode::Recursive)?;

    let stability_delay = Duration::from_secs(settings.stability_delay_secs);

    tracing::info!(
        vault = %settings.vault_root.display(),
        "Watching vault for new images"
    );

    loop {
        // Check for stop signal
        if stop_rx.try_recv().is_ok() {
            tracing::info!("Watcher stopping...");
            break;
        }

        // Check for file events (non-blocking with timeout)
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(events)) => {
                for event in events {
                    let path = event.path;

                    if is_hidden(&path) || !settings.is_watched_file(&path) {
                        continue;
                    }
                    if path
                        .strip_prefix(&settings.vault_root)
                        .map(|rel| rel.components().any(|c| is_hidden(Path::new(c.as_os_str()))))
                        .unwrap_or(false)
                    {
                        continue;
                    }

                    if let Ok(metadata) = std::fs::metadata(&path) {
                        if metadata.is_file() {
                            pending.insert(path, (metadata.len(), Instant::now()));
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watcher error: {:?}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Expected - continue to stability check
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("Watcher channel disconnected");
                break;
            }
        }

        // Admit files whose size held still for the stability delay
        let now = Instant::now();
        let mut stable = Vec::new();
        let mut changed = Vec::new();

        for (path, (last_size, last_seen)) in pending.iter() {
            if now.duration_since(*last_seen) < stability_delay {
                continue;
            }
            match std::fs::metadata(path) {
                Ok(metadata) if metadata.len() == *last_size && metadata.len() > 0 => {
                    stable.push(path.clone());
                }
                Ok(metadata) => changed.push((path.clone(), metadata.len())),
                Err(_) => {
                    // File vanished while stabilizing
                    changed.push((path.clone(), 0));
                }
            }
        }

        for (path, size) in changed {
            if size == 0 && !path.exists() {
                pending.remove(&path);
            } else {
                pending.insert(path, (size, Instant::now()));
            }
        }

        for path in stable {
            pending.remove(&path);
            if queue.enqueue(&path).await {
                tracing::info!(path = %path.display(), "New image queued");
            } else {
                tracing::debug!(path = %path.display(), "Image already known to queue");
            }
        }

        // Small sleep to prevent busy loop
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_detection() {
        assert!(is_hidden(Path::new("/vault/.obsidian")));
        assert!(is_hidden(Path::new(".pixnote")));
        assert!(!is_hidden(Path::new("/vault/Notes")));
    }

    #[test]
    fn test_validate_missing_vault() {
        let watcher = VaultWatcher::new(Settings::for_vault("/definitely/not/here"));
        assert!(matches!(
            watcher.validate(),
            Err(WatcherError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_scan_result_totals() {
        let result = ScanResult {
            admitted: 2,
            skipped: 3,
            errors: 0,
        };
        assert_eq!(result.total_seen(), 5);
    }
}
