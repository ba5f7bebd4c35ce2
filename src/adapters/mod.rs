//! Adapter interfaces for external systems.
//!
//! The only external system the pipeline talks to is the remote
//! transcription service; the trait keeps it swappable (and mockable in
//! tests) while owning its own retry/backoff policy.

pub mod vision;

use anyhow::Result;
use async_trait::async_trait;

pub use vision::VisionProvider;

/// Remote capability turning image bytes into transcribed text.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Transcribe an image. An `Err` or empty result is a terminal
    /// transcription failure for the invoking job; retries, if any, happen
    /// inside the provider.
    async fn transcribe(
        &self,
        image: &[u8],
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String>;

    /// Cheap connectivity/credentials check.
    async fn health_check(&self) -> Result<()>;
}
