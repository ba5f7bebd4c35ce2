//! The processing queue.
//!
//! Admits file events, deduplicates them (in-flight jobs plus a short-lived
//! per-path admission lock), bounds concurrency, and drives each admitted
//! job through the pipeline stage sequence. Completion of any job is the
//! sole scheduling re-entry point, so the queue is self-driving and needs no
//! external polling.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::domain::{Job, JobStatus, PathKey};
use crate::notify::Notifier;
use crate::storage::Storage;

use super::pipeline::{PipelineRunner, StageFailure};

/// Per-status job counts, for status lines and assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.done + self.error
    }
}

struct QueueState {
    /// All jobs in admission order; FIFO scheduling scans for the first
    /// `Pending` entry.
    jobs: Vec<Job>,

    /// Admission locks: paths between event arrival and queue insertion.
    admission: HashSet<PathKey>,

    /// Number of jobs currently `Processing`.
    active: usize,

    /// Concurrency limit (>= 1).
    limit: usize,
}

struct QueueInner {
    runner: PipelineRunner,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// The job queue: one worker stream per vault instance.
#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<QueueInner>,
}

impl ProcessingQueue {
    /// Build a queue around a pipeline runner. The concurrency limit comes
    /// from the runner's settings.
    pub fn new(runner: PipelineRunner) -> Self {
        let limit = runner.settings().concurrency.max(1);
        let storage = runner.storage().clone();
        let notifier = runner.notifier().clone();
        Self {
            inner: Arc::new(QueueInner {
                runner,
                storage,
                notifier,
                state: Mutex::new(QueueState {
                    jobs: Vec::new(),
                    admission: HashSet::new(),
                    active: 0,
                    limit,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Admit a file for processing.
    ///
    /// Returns false (a no-op) when a job for the same normalized path is
    /// already `Pending`/`Processing`, when its admission lock is held, or
    /// when the file no longer exists. Terminal jobs do not block
    /// re-admission.
    pub async fn enqueue(&self, file: impl AsRef<Path>) -> bool {
        let file = file.as_ref();
        let key = PathKey::new(file);

        {
            let mut state = self.inner.state.lock().await;
            if state.admission.contains(&key) {
                trace!(path = %key, "Admission already in progress");
                return false;
            }
            if state
                .jobs
                .iter()
                .any(|j| j.key == key && j.status.is_open())
            {
                debug!(path = %key, "Already queued, ignoring");
                return false;
            }
            state.admission.insert(key.clone());
        }

        // The admission lock covers this await: a concurrent event for the
        // same path cannot slip a second job in while we look at the file.
        let exists = self.inner.storage.exists(file).await;

        let admitted = {
            let mut state = self.inner.state.lock().await;
            state.admission.remove(&key);
            if exists {
                let job = Job::new(file.to_path_buf());
                debug!(path = %key, id = %job.id, "Job admitted");
                state.jobs.push(job);
                true
            } else {
                warn!(path = %key, "File vanished before admission");
                false
            }
        };

        if admitted {
            QueueInner::schedule_next(&self.inner).await;
        }
        admitted
    }

    /// Bound the number of simultaneously processing jobs (clamped to >= 1).
    pub async fn set_concurrency_limit(&self, limit: usize) {
        {
            let mut state = self.inner.state.lock().await;
            state.limit = limit.max(1);
        }
        QueueInner::schedule_next(&self.inner).await;
    }

    /// Idempotent terminal transition to `Done`.
    pub async fn mark_done(&self, id: Uuid) {
        self.inner.mark_terminal(id, JobStatus::Done, None).await;
    }

    /// Idempotent terminal transition to `Error`.
    pub async fn mark_error(&self, id: Uuid, reason: impl Into<String>) {
        self.inner
            .mark_terminal(id, JobStatus::Error, Some(reason.into()))
            .await;
    }

    /// Wait until no job is `Pending` or `Processing`.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle().await {
                return;
            }
            notified.await;
        }
    }

    async fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.active == 0
            && state.admission.is_empty()
            && !state.jobs.iter().any(|j| j.status == JobStatus::Pending)
    }

    /// Snapshot of all jobs in admission order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.state.lock().await.jobs.clone()
    }

    /// Latest job record for a path, if any.
    pub async fn job_for(&self, file: impl AsRef<Path>) -> Option<Job> {
        let key = PathKey::new(file.as_ref());
        self.inner
            .state
            .lock()
            .await
            .jobs
            .iter()
            .rev()
            .find(|j| j.key == key)
            .cloned()
    }

    /// Per-status counts.
    pub async fn counts(&self) -> QueueCounts {
        let state = self.inner.state.lock().await;
        let mut counts = QueueCounts::default();
        for job in &state.jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Error => counts.error += 1,
            }
        }
        counts
    }
}

impl QueueInner {
    /// Start pending jobs while slots are free. Called after admission,
    /// after every completion, and after a limit change.
    ///
    /// Returns an explicitly boxed `Send` future rather than an `async fn`
    /// so the opaque return type does not form a Send-inference cycle with
    /// the `run_job` task it spawns (which in turn awaits `schedule_next`).
    fn schedule_next(
        inner: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        let inner = inner.clone();
        Box::pin(async move {
        let inner = &inner;
        loop {
            let next = {
                let mut state = inner.state.lock().await;
                if state.active >= state.limit {
                    None
                } else {
                    // FIFO: jobs are stored in admission order
                    let picked = state
                        .jobs
                        .iter_mut()
                        .find(|j| j.status == JobStatus::Pending)
                        .map(|job| {
                            job.status = JobStatus::Processing;
                            (job.id, job.initial_file.clone(), job.file_name())
                        });
                    if picked.is_some() {
                        state.active += 1;
                    }
                    picked
                }
            };

            let Some((id, file, name)) = next else { break };

            let worker = inner.clone();
            tokio::spawn(async move {
                worker.run_job(id, file, name).await;
            });
        }
        })
    }

    async fn run_job(self: Arc<Self>, id: Uuid, file: std::path::PathBuf, name: String) {
        // The nested JoinHandle is the panic boundary: an aborted pipeline
        // task becomes an InternalFailure instead of a stuck slot.
        let runner_owner = self.clone();
        let handle = tokio::spawn(async move { runner_owner.runner.run(&file).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(StageFailure::Internal(format!(
                "pipeline task aborted: {join_err}"
            ))),
        };

        match result {
            Ok(outcome) => {
                self.notifier.job_done(&name, outcome.note());
                self.mark_terminal(id, JobStatus::Done, None).await;
            }
            Err(failure) => {
                let reason = failure.to_string();
                self.notifier.job_failed(&name, &reason);
                self.mark_terminal(id, JobStatus::Error, Some(reason)).await;
            }
        }

        {
            let mut state = self.state.lock().await;
            state.active = state.active.saturating_sub(1);
        }

        // Sole scheduling re-entry point
        Self::schedule_next(&self).await;
        self.idle.notify_waiters();
    }

    /// Apply a terminal transition; terminal states are never overwritten
    /// and unknown ids are ignored.
    async fn mark_terminal(&self, id: Uuid, status: JobStatus, error: Option<String>) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = status;
            job.error = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::config::{CompressionOptions, Settings};
    use crate::core::history::ProcessedHistory;
    use crate::core::pipeline::Collaborators;
    use crate::note::NoteMaterializer;
    use crate::notify::LogNotifier;
    use crate::storage::FsStorage;
    use crate::transform::{Compressor, FormatConverter};

    struct NoConverter;

    #[async_trait]
    impl FormatConverter for NoConverter {
        fn needs_conversion(&self, _path: &Path) -> bool {
            false
        }
        async fn convert(&self, path: &Path) -> Result<PathBuf> {
            Ok(path.to_path_buf())
        }
    }

    struct NoCompressor;

    #[async_trait]
    impl Compressor for NoCompressor {
        async fn compress(&self, _path: &Path, _options: &CompressionOptions) -> Result<()> {
            Ok(())
        }
    }

    struct StaticProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl crate::adapters::TranscriptionProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }
        async fn transcribe(&self, _image: &[u8], _sys: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("transcribed text".to_string())
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct PlainMaterializer {
        storage: Arc<dyn Storage>,
    }

    #[async_trait]
    impl NoteMaterializer for PlainMaterializer {
        async fn create_note(&self, text: &str, image: &Path, dir: &Path) -> Result<PathBuf> {
            let stem = image.file_stem().unwrap_or_default().to_string_lossy();
            self.storage
                .write_note(&dir.join(format!("{stem}.md")), text)
                .await
        }
    }

    async fn test_queue(vault: &Path) -> ProcessingQueue {
        let settings = Settings::for_vault(vault);
        let storage: Arc<dyn Storage> = Arc::new(FsStorage::new());
        let history = Arc::new(ProcessedHistory::load(settings.history_file.clone()).await);
        let runner = PipelineRunner::new(
            settings,
            history,
            Collaborators {
                storage: storage.clone(),
                converter: Arc::new(NoConverter),
                compressor: Arc::new(NoCompressor),
                provider: Arc::new(StaticProvider {
                    calls: AtomicUsize::new(0),
                }),
                materializer: Arc::new(PlainMaterializer {
                    storage: storage.clone(),
                }),
                notifier: Arc::new(LogNotifier::new()),
            },
        );
        ProcessingQueue::new(runner)
    }

    #[tokio::test]
    async fn test_missing_file_not_admitted() {
        let temp = TempDir::new().unwrap();
        let queue = test_queue(temp.path()).await;

        assert!(!queue.enqueue(temp.path().join("ghost.jpg")).await);
        assert_eq!(queue.counts().await.total(), 0);
    }

    #[tokio::test]
    async fn test_single_file_reaches_done() {
        let temp = TempDir::new().unwrap();
        let notes = temp.path().join("Notes");
        std::fs::create_dir_all(&notes).unwrap();
        let file = notes.join("a.jpg");
        std::fs::write(&file, b"pixels").unwrap();

        let queue = test_queue(temp.path()).await;
        assert!(queue.enqueue(&file).await);
        queue.drain().await;

        let job = queue.job_for(&file).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(notes.join("Images").join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_normalized_duplicate_rejected_while_open() {
        let temp = TempDir::new().unwrap();
        let notes = temp.path().join("Notes");
        std::fs::create_dir_all(&notes).unwrap();
        std::fs::write(notes.join("a.jpg"), b"pixels").unwrap();

        let queue = test_queue(temp.path()).await;
        // Admit, then immediately re-offer via a non-normalized alias; the
        // first job is still open so the second admission must be a no-op.
        assert!(queue.enqueue(notes.join("a.jpg")).await);
        let alias = notes.join(".").join("a.jpg");
        let second = queue.enqueue(&alias).await;
        queue.drain().await;

        assert!(!second || queue.counts().await.total() == 1);
        assert_eq!(queue.counts().await.done, queue.counts().await.total());
    }

    #[tokio::test]
    async fn test_terminal_job_allows_readmission() {
        let temp = TempDir::new().unwrap();
        let notes = temp.path().join("Notes");
        std::fs::create_dir_all(&notes).unwrap();
        let file = notes.join("a.jpg");
        std::fs::write(&file, b"pixels").unwrap();

        let queue = test_queue(temp.path()).await;
        queue.enqueue(&file).await;
        queue.drain().await;

        // First run moved it; re-admit at the final location
        let moved = notes.join("Images").join("a.jpg");
        assert!(queue.enqueue(&moved).await);
        queue.drain().await;

        assert_eq!(queue.counts().await.done, 2);
    }

    #[tokio::test]
    async fn test_mark_terminal_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let notes = temp.path().join("Notes");
        std::fs::create_dir_all(&notes).unwrap();
        let file = notes.join("a.jpg");
        std::fs::write(&file, b"pixels").unwrap();

        let queue = test_queue(temp.path()).await;
        queue.enqueue(&file).await;
        queue.drain().await;

        let job = queue.job_for(&file).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);

        // A late error report must not overwrite the terminal state
        queue.mark_error(job.id, "too late").await;
        let job = queue.job_for(&file).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());
    }
}
