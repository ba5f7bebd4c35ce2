//! Command-line interface for pixnote.
//!
//! Provides commands for watching a vault, one-shot scanning, processing a
//! single file, managing the processed history, and checking provider
//! connectivity.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{TranscriptionProvider, VisionProvider};
use crate::config::Settings;
use crate::core::{Collaborators, PipelineRunner, ProcessedHistory, ProcessingQueue};
use crate::domain::JobStatus;
use crate::ingest::VaultWatcher;
use crate::note::MarkdownMaterializer;
use crate::notify::LogNotifier;
use crate::storage::{FsStorage, Storage};
use crate::transform::{HeifConverter, ImageCompressor};

/// pixnote - image inbox to AI-transcribed note pipeline
#[derive(Parser, Debug)]
#[command(name = "pixnote")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Vault root (overrides the config file)
    #[arg(short, long, global = true, env = "PIXNOTE_VAULT")]
    pub vault: Option<PathBuf>,

    /// Config file (default: <vault>/.pixnote/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the vault and process new images as they appear
    Watch {
        /// Sweep the vault for existing images before watching
        #[arg(long)]
        scan: bool,
    },

    /// Sweep the vault once, process everything found, then exit
    Scan,

    /// Process a single image file and exit
    Process {
        /// Image file to process
        file: PathBuf,
    },

    /// Inspect or reset the processed history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Verify transcription provider connectivity and credentials
    Check,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List all processed paths
    List,

    /// Forget all processed paths, forcing full reprocessing
    Clear,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref(), self.vault.clone())?;

        match self.command {
            Commands::Watch { scan } => watch(settings, scan).await,
            Commands::Scan => scan_once(settings).await,
            Commands::Process { file } => process_one(settings, file).await,
            Commands::History { command } => history(settings, command).await,
            Commands::Check => check(settings).await,
        }
    }
}

/// Wire up the real collaborators and build the queue.
async fn build_queue(settings: &Settings) -> Result<ProcessingQueue> {
    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new());
    let history = Arc::new(ProcessedHistory::load(settings.history_file.clone()).await);
    let provider = Arc::new(VisionProvider::from_settings(&settings.provider)?);

    let runner = PipelineRunner::new(
        settings.clone(),
        history,
        Collaborators {
            storage: storage.clone(),
            converter: Arc::new(HeifConverter::new(settings)),
            compressor: Arc::new(ImageCompressor::new()),
            provider,
            materializer: Arc::new(MarkdownMaterializer::new(storage.clone())),
            notifier: Arc::new(LogNotifier::new()),
        },
    );

    Ok(ProcessingQueue::new(runner))
}

async fn watch(settings: Settings, scan: bool) -> Result<()> {
    let queue = build_queue(&settings).await?;
    let watcher = VaultWatcher::new(settings);

    if scan {
        let result = watcher.scan_vault(&queue).await?;
        println!(
            "Catch-up scan: {} admitted, {} skipped",
            result.admitted, result.skipped
        );
    }

    let handle = watcher.watch(queue.clone()).await?;
    println!("Watching vault. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    handle.stop().await?;

    // Jobs are never cancelled mid-pipeline; let in-flight work finish.
    queue.drain().await;

    let counts = queue.counts().await;
    println!(
        "Done: {} processed, {} failed",
        counts.done, counts.error
    );
    Ok(())
}

async fn scan_once(settings: Settings) -> Result<()> {
    let queue = build_queue(&settings).await?;
    let watcher = VaultWatcher::new(settings);

    let result = watcher.scan_vault(&queue).await?;
    queue.drain().await;

    let counts = queue.counts().await;
    println!(
        "Scanned {} images: {} processed, {} failed, {} skipped",
        result.total_seen(),
        counts.done,
        counts.error,
        result.skipped
    );

    for job in queue.jobs().await {
        if job.status == JobStatus::Error {
            println!(
                "  FAILED {}: {}",
                job.file_name(),
                job.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    Ok(())
}

async fn process_one(settings: Settings, file: PathBuf) -> Result<()> {
    let queue = build_queue(&settings).await?;

    if !queue.enqueue(&file).await {
        anyhow::bail!("File was not admitted: {}", file.display());
    }
    queue.drain().await;

    let job = queue
        .job_for(&file)
        .await
        .context("Job record disappeared")?;

    match job.status {
        JobStatus::Done => {
            println!("Processed {}", job.file_name());
            Ok(())
        }
        JobStatus::Error => {
            anyhow::bail!(
                "Processing failed: {}",
                job.error.as_deref().unwrap_or("unknown")
            )
        }
        // drain() guarantees a terminal state
        _ => anyhow::bail!("Job ended in unexpected state"),
    }
}

async fn history(settings: Settings, command: HistoryCommands) -> Result<()> {
    let history = ProcessedHistory::load(settings.history_file.clone()).await;

    match command {
        HistoryCommands::List => {
            let entries = history.entries().await;
            if entries.is_empty() {
                println!("History is empty.");
            } else {
                for entry in &entries {
                    println!("{entry}");
                }
                println!("{} entries", entries.len());
            }
        }
        HistoryCommands::Clear => {
            let count = history.len().await;
            history.clear().await?;
            println!("Cleared {count} history entries.");
        }
    }

    Ok(())
}

async fn check(settings: Settings) -> Result<()> {
    let provider = VisionProvider::from_settings(&settings.provider)?;
    provider.health_check().await?;
    println!(
        "Provider '{}' reachable at {}",
        provider.name(),
        settings.provider.api_base
    );
    Ok(())
}
