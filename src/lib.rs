//! pixnote - image inbox to AI-transcribed note pipeline
//!
//! Turns a newly appeared image file in a Markdown vault into a finished,
//! AI-transcribed note.
//!
//! # Architecture
//!
//! The system is built around a sequential, resumable, deduplicating job
//! pipeline:
//! - The queue admits file events, dedupes them per path, and bounds
//!   concurrency
//! - Each job runs a fixed stage sequence: convert, compress, resolve
//!   destinations, provision folders, collision check, move, idempotency
//!   check, transcribe, materialize note, commit history
//! - The processed history survives restarts, so re-offered files become
//!   cheap no-ops
//!
//! # Modules
//!
//! - `adapters`: remote transcription provider
//! - `core`: queue scheduler, pipeline stages, processed history
//! - `domain`: data structures (Job, PathKey)
//! - `ingest`: vault watcher and scanner
//! - `note` / `storage` / `transform` / `notify`: collaborator seams
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Watch a vault
//! pixnote --vault ~/Vault watch --scan
//!
//! # Process one file
//! pixnote --vault ~/Vault process ~/Vault/Notes/a.jpg
//!
//! # Reset the processed history
//! pixnote --vault ~/Vault history clear
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod note;
pub mod notify;
pub mod storage;
pub mod transform;

// Re-export main types at crate root for convenience
pub use crate::adapters::{TranscriptionProvider, VisionProvider};
pub use crate::config::{CompressionOptions, ImageDestination, NoteDestination, Settings};
pub use crate::core::{
    Collaborators, PipelineOutcome, PipelineRunner, ProcessedHistory, ProcessingQueue,
    QueueCounts, StageFailure,
};
pub use crate::domain::{Job, JobStatus, PathKey};
pub use crate::ingest::{ScanResult, VaultWatcher, WatchHandle};
pub use crate::note::{MarkdownMaterializer, NoteMaterializer};
pub use crate::notify::{LogNotifier, Notifier};
pub use crate::storage::{FsStorage, Storage};
pub use crate::transform::{Compressor, FormatConverter, HeifConverter, ImageCompressor};
