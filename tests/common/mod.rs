//! Shared mock collaborators for the integration tests.
//!
//! The real `FsStorage` runs against a TempDir vault; everything remote or
//! expensive is replaced with counting/blocking/failing fakes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use pixnote::config::CompressionOptions;
use pixnote::{
    Collaborators, Compressor, FormatConverter, FsStorage, MarkdownMaterializer,
    NoteMaterializer, Notifier, PipelineRunner, ProcessedHistory, ProcessingQueue, Settings,
    Storage, TranscriptionProvider,
};

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Returns a fixed transcription and counts invocations.
pub struct CountingProvider {
    pub calls: AtomicUsize,
    text: String,
}

impl CountingProvider {
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            text: text.into(),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn transcribe(&self, _image: &[u8], _system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Always fails.
pub struct FailingProvider;

#[async_trait]
impl TranscriptionProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn transcribe(&self, _image: &[u8], _system: &str, _user: &str) -> Result<String> {
        anyhow::bail!("simulated provider outage")
    }

    async fn health_check(&self) -> Result<()> {
        anyhow::bail!("simulated provider outage")
    }
}

/// Blocks every call until `release()`; counts entries immediately.
pub struct BlockingProvider {
    pub calls: AtomicUsize,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl BlockingProvider {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = watch::channel(false);
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            tx,
            rx,
        })
    }

    /// Let all blocked (and future) calls through.
    pub fn release(&self) {
        let _ = self.tx.send(true);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionProvider for BlockingProvider {
    fn name(&self) -> &str {
        "blocking"
    }

    async fn transcribe(&self, _image: &[u8], _system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.rx.clone();
        rx.wait_for(|released| *released)
            .await
            .map_err(|_| anyhow::anyhow!("release channel closed"))?;
        Ok("blocked transcription".to_string())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Records transcription payloads in call order. With a concurrency limit
/// of 1 this observes the queue's FIFO start order.
pub struct RecordingProvider {
    pub seen: std::sync::Mutex<Vec<Vec<u8>>>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn seen_payloads(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn transcribe(&self, image: &[u8], _system: &str, _user: &str) -> Result<String> {
        self.seen.lock().unwrap().push(image.to_vec());
        Ok("recorded".to_string())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Fails only for payloads containing the marker, succeeds otherwise.
pub struct SelectiveProvider {
    pub calls: AtomicUsize,
    marker: Vec<u8>,
}

impl SelectiveProvider {
    pub fn failing_on(marker: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            marker: marker.to_vec(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for SelectiveProvider {
    fn name(&self) -> &str {
        "selective"
    }

    async fn transcribe(&self, image: &[u8], _system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image
            .windows(self.marker.len().max(1))
            .any(|w| w == self.marker.as_slice())
        {
            anyhow::bail!("simulated failure for marked payload");
        }
        Ok("selective transcription".to_string())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Never converts anything.
pub struct NoopConverter;

#[async_trait]
impl FormatConverter for NoopConverter {
    fn needs_conversion(&self, _path: &Path) -> bool {
        false
    }

    async fn convert(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// Claims `.heic` files and fails to convert them.
pub struct FailingConverter;

#[async_trait]
impl FormatConverter for FailingConverter {
    fn needs_conversion(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("heic")
    }

    async fn convert(&self, _path: &Path) -> Result<PathBuf> {
        anyhow::bail!("simulated decoder failure")
    }
}

/// "Converts" `.heic` files by rewriting them as a `.jpg` sibling and
/// removing the source, mimicking the real converter's replace semantics.
pub struct ExtensionConverter;

#[async_trait]
impl FormatConverter for ExtensionConverter {
    fn needs_conversion(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("heic")
    }

    async fn convert(&self, path: &Path) -> Result<PathBuf> {
        let target = path.with_extension("jpg");
        let bytes = tokio::fs::read(path).await?;
        tokio::fs::write(&target, bytes).await?;
        tokio::fs::remove_file(path).await?;
        Ok(target)
    }
}

/// Leaves files untouched.
pub struct NoopCompressor;

#[async_trait]
impl Compressor for NoopCompressor {
    async fn compress(&self, _path: &Path, _options: &CompressionOptions) -> Result<()> {
        Ok(())
    }
}

/// Always fails; the pipeline must continue with the uncompressed file.
pub struct FailingCompressor;

#[async_trait]
impl Compressor for FailingCompressor {
    async fn compress(&self, _path: &Path, _options: &CompressionOptions) -> Result<()> {
        anyhow::bail!("simulated compression failure")
    }
}

// ---------------------------------------------------------------------------
// Materializers and notifier
// ---------------------------------------------------------------------------

/// Real markdown materializer plus an invocation counter.
pub struct CountingMaterializer {
    pub calls: AtomicUsize,
    inner: MarkdownMaterializer,
}

impl CountingMaterializer {
    pub fn new(storage: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            inner: MarkdownMaterializer::new(storage),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteMaterializer for CountingMaterializer {
    async fn create_note(&self, text: &str, image: &Path, note_dir: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_note(text, image, note_dir).await
    }
}

/// Always fails.
pub struct FailingMaterializer;

#[async_trait]
impl NoteMaterializer for FailingMaterializer {
    async fn create_note(&self, _text: &str, _image: &Path, _note_dir: &Path) -> Result<PathBuf> {
        anyhow::bail!("simulated note write failure")
    }
}

/// Swallows notifications.
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn job_done(&self, _file: &str, _note: Option<&Path>) {}
    fn job_failed(&self, _file: &str, _reason: &str) {}
    fn compression_degraded(&self, _file: &str, _reason: &str) {}
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

/// Everything a test vault needs in one place.
pub struct TestVault {
    pub settings: Settings,
    pub storage: Arc<dyn Storage>,
    pub history: Arc<ProcessedHistory>,
}

impl TestVault {
    pub async fn new(root: &Path) -> Self {
        let settings = Settings::for_vault(root);
        let history = Arc::new(ProcessedHistory::load(settings.history_file.clone()).await);
        Self {
            settings,
            storage: Arc::new(FsStorage::new()),
            history,
        }
    }

    /// Queue with the given provider and defaults for everything else.
    pub fn queue(&self, provider: Arc<dyn TranscriptionProvider>) -> ProcessingQueue {
        self.queue_with(
            provider,
            Arc::new(NoopConverter),
            Arc::new(NoopCompressor),
            CountingMaterializer::new(self.storage.clone()),
        )
    }

    pub fn queue_with(
        &self,
        provider: Arc<dyn TranscriptionProvider>,
        converter: Arc<dyn FormatConverter>,
        compressor: Arc<dyn Compressor>,
        materializer: Arc<dyn NoteMaterializer>,
    ) -> ProcessingQueue {
        let runner = PipelineRunner::new(
            self.settings.clone(),
            self.history.clone(),
            Collaborators {
                storage: self.storage.clone(),
                converter,
                compressor,
                provider,
                materializer,
                notifier: Arc::new(SilentNotifier),
            },
        );
        ProcessingQueue::new(runner)
    }
}

/// Create `<vault>/Notes/<name>` with the given bytes, returning its path.
pub fn seed_image(vault: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let notes = vault.join("Notes");
    std::fs::create_dir_all(&notes).unwrap();
    let path = notes.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Poll until `condition` holds or the timeout elapses.
pub async fn wait_until<F, Fut>(mut condition: F, timeout: std::time::Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if std::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
