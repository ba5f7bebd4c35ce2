//! Job records tracked by the processing queue.
//!
//! A job is created when a file is admitted, mutated only by the worker
//! driving it through the pipeline, and kept (in terminal state) for
//! inspection afterwards. The working-file reference lives in the pipeline
//! runner; the queue record anchors identity to the file as first observed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::path_key::PathKey;

/// Status of a job in the queue.
///
/// Transitions are strictly monotonic: `Pending → Processing → {Done | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted, waiting for a worker slot
    Pending,

    /// A worker is driving it through the pipeline stages
    Processing,

    /// Reached the end of the pipeline (including the already-processed no-op)
    Done,

    /// A stage failed terminally
    Error,
}

impl JobStatus {
    /// True while the job still occupies its path for dedup purposes.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// True once the job has reached `Done` or `Error`.
    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }
}

/// One image's progress through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Normalized identity of `initial_file`, used for dedup
    pub key: PathKey,

    /// The file as first observed; never mutated
    pub initial_file: PathBuf,

    /// Current status
    pub status: JobStatus,

    /// Failure reason, set only when `status == Error`
    pub error: Option<String>,

    /// When the job was admitted
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly admitted job for a file.
    pub fn new(initial_file: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: PathKey::new(&initial_file),
            initial_file,
            status: JobStatus::Pending,
            error: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Short display name for log lines and notifications.
    pub fn file_name(&self) -> String {
        self.initial_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.initial_file.display().to_string())
    }
}
