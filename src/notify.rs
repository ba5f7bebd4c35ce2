//! User-visible outcome reporting.
//!
//! Each terminal outcome is reported exactly once by the queue. Compression
//! degradation is verbose-level only since the job still completes.

use std::path::Path;

/// Sink for per-job, user-facing notifications.
pub trait Notifier: Send + Sync {
    fn job_done(&self, file: &str, note: Option<&Path>);

    fn job_failed(&self, file: &str, reason: &str);

    fn compression_degraded(&self, file: &str, reason: &str);
}

/// Default notifier: structured log lines.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn job_done(&self, file: &str, note: Option<&Path>) {
        match note {
            Some(note) => tracing::info!(%file, note = %note.display(), "Transcribed"),
            None => tracing::info!(%file, "Already processed, skipped"),
        }
    }

    fn job_failed(&self, file: &str, reason: &str) {
        tracing::error!(%file, %reason, "Processing failed");
    }

    fn compression_degraded(&self, file: &str, reason: &str) {
        tracing::debug!(%file, %reason, "Compression skipped, using original file");
    }
}
