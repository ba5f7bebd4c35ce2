//! The per-job pipeline stage sequence.
//!
//! A fixed, ordered sequence run by a worker for each admitted job. Each
//! stage either forwards a successor working-file reference or signals
//! terminal failure; on terminal failure the remaining stages are skipped.
//! Compression (stage 2) is the one non-terminal stage: the job continues
//! with the uncompressed file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::adapters::TranscriptionProvider;
use crate::config::{ImageDestination, NoteDestination, Settings};
use crate::domain::PathKey;
use crate::note::NoteMaterializer;
use crate::notify::Notifier;
use crate::storage::Storage;
use crate::transform::{Compressor, FormatConverter};

use super::history::ProcessedHistory;

/// Terminal stage failures. Compression failures are deliberately absent:
/// they degrade, they don't terminate.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("folder handling failed: {0}")]
    Folder(String),

    #[error("duplicate name in target folder: {0}")]
    Collision(String),

    #[error("file move error: {0}")]
    Move(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("note creation failed: {0}")]
    NoteCreation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The full sequence ran: image at its destination, note created.
    Processed { image: PathBuf, note: PathBuf },

    /// The final path was already in the processed history; stages 8-9
    /// were skipped and the job counts as done.
    AlreadyProcessed { image: PathBuf },
}

impl PipelineOutcome {
    pub fn image(&self) -> &Path {
        match self {
            Self::Processed { image, .. } | Self::AlreadyProcessed { image } => image,
        }
    }

    pub fn note(&self) -> Option<&Path> {
        match self {
            Self::Processed { note, .. } => Some(note),
            Self::AlreadyProcessed { .. } => None,
        }
    }
}

/// Strategy objects for every collaborator capability, supplied at
/// construction so tests can substitute fakes.
pub struct Collaborators {
    pub storage: Arc<dyn Storage>,
    pub converter: Arc<dyn FormatConverter>,
    pub compressor: Arc<dyn Compressor>,
    pub provider: Arc<dyn TranscriptionProvider>,
    pub materializer: Arc<dyn NoteMaterializer>,
    pub notifier: Arc<dyn Notifier>,
}

/// Resolved destination folders for one job, computed once before any move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub image_dir: PathBuf,
    pub note_dir: PathBuf,
    /// The file already sits in its destination folder; no move occurs.
    pub in_place: bool,
}

/// Compute target folders from configuration.
///
/// Already-in-destination detection compares the file's immediate parent
/// folder name against the configured subfolder name (or the fixed image
/// folder path); in that case an `Alongside` note folder is promoted one
/// level up so notes don't nest inside the image folder.
pub fn resolve_destinations(
    file: &Path,
    settings: &Settings,
) -> Result<Destinations, StageFailure> {
    let parent = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            StageFailure::Internal(format!("{} has no parent folder", file.display()))
        })?;

    let (image_dir, in_place) = match &settings.image_destination {
        ImageDestination::Subfolder(name) => {
            let parent_name = parent.file_name().and_then(|n| n.to_str());
            if parent_name == Some(name.as_str()) {
                (parent.to_path_buf(), true)
            } else {
                (parent.join(name), false)
            }
        }
        ImageDestination::Fixed(path) => {
            let in_place = PathKey::new(parent) == PathKey::new(path);
            (path.clone(), in_place)
        }
    };

    let note_dir = match &settings.note_destination {
        NoteDestination::Alongside => {
            if in_place {
                parent
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| parent.to_path_buf())
            } else {
                parent.to_path_buf()
            }
        }
        NoteDestination::Fixed(path) => path.clone(),
    };

    Ok(Destinations {
        image_dir,
        note_dir,
        in_place,
    })
}

/// Drives one job through the fixed stage sequence.
pub struct PipelineRunner {
    settings: Settings,
    history: Arc<ProcessedHistory>,
    storage: Arc<dyn Storage>,
    converter: Arc<dyn FormatConverter>,
    compressor: Arc<dyn Compressor>,
    provider: Arc<dyn TranscriptionProvider>,
    materializer: Arc<dyn NoteMaterializer>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineRunner {
    pub fn new(
        settings: Settings,
        history: Arc<ProcessedHistory>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            settings,
            history,
            storage: collaborators.storage,
            converter: collaborators.converter,
            compressor: collaborators.compressor,
            provider: collaborators.provider,
            materializer: collaborators.materializer,
            notifier: collaborators.notifier,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Run stages 1-10 for a file, returning the terminal outcome.
    #[instrument(skip(self), fields(file = %file.display()))]
    pub async fn run(&self, file: &Path) -> Result<PipelineOutcome, StageFailure> {
        let mut working = file.to_path_buf();

        // Stage 1: format normalization. Nothing downstream can work
        // without pixel data, so failure is terminal.
        if self.converter.needs_conversion(&working) {
            working = self
                .converter
                .convert(&working)
                .await
                .map_err(|e| StageFailure::Conversion(e.to_string()))?;
            debug!(working = %working.display(), "Converted to raster format");
        }

        // Stage 2: size reduction, best effort. Correctness does not depend
        // on file size.
        if let Err(e) = self
            .compressor
            .compress(&working, &self.settings.compression)
            .await
        {
            self.notifier
                .compression_degraded(&display_name(&working), &e.to_string());
        }

        // Stage 3: destination resolution
        let dest = resolve_destinations(&working, &self.settings)?;

        // Stage 4: folder provisioning
        for dir in [&dest.image_dir, &dest.note_dir] {
            self.storage
                .create_folder(dir)
                .await
                .map_err(|e| StageFailure::Folder(e.to_string()))?;
        }

        // Stages 5-6: collision check, then move
        let file_name = working.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
            StageFailure::Internal(format!("{} has no file name", working.display()))
        })?;
        let target = dest.image_dir.join(&file_name);

        if PathKey::new(&target) != PathKey::new(&working) {
            if self.storage.exists(&target).await {
                return Err(StageFailure::Collision(target.display().to_string()));
            }
            self.storage
                .rename(&working, &target)
                .await
                .map_err(|e| StageFailure::Move(e.to_string()))?;
            working = target;
        }

        // Stage 7: idempotency check against the processed history
        let final_key = PathKey::new(&working);
        if self.history.contains(&final_key).await {
            debug!(path = %final_key, "Already transcribed, skipping");
            return Ok(PipelineOutcome::AlreadyProcessed { image: working });
        }

        // Stage 8: transcription
        let bytes = self
            .storage
            .read_bytes(&working)
            .await
            .map_err(|e| StageFailure::Transcription(e.to_string()))?;
        let text = self
            .provider
            .transcribe(
                &bytes,
                &self.settings.provider.system_prompt,
                &self.settings.provider.user_prompt,
            )
            .await
            .map_err(|e| StageFailure::Transcription(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(StageFailure::Transcription(
                "provider returned empty text".to_string(),
            ));
        }

        // Stage 9: note materialization
        let note = self
            .materializer
            .create_note(&text, &working, &dest.note_dir)
            .await
            .map_err(|e| StageFailure::NoteCreation(e.to_string()))?;

        // Stage 10: history commit, only after the note exists
        self.history
            .add(&final_key)
            .await
            .map_err(|e| StageFailure::Internal(format!("history commit failed: {e}")))?;

        Ok(PipelineOutcome::Processed {
            image: working,
            note,
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
