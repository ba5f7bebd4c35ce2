//! Core orchestration logic.
//!
//! - ProcessingQueue: admission, dedup, concurrency-bounded scheduling
//! - PipelineRunner: the fixed per-job stage sequence
//! - ProcessedHistory: durable record of already-transcribed paths

pub mod history;
pub mod pipeline;
pub mod queue;

pub use history::ProcessedHistory;
pub use pipeline::{Collaborators, PipelineOutcome, PipelineRunner, StageFailure};
pub use queue::{ProcessingQueue, QueueCounts};
