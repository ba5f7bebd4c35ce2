//! Configuration for pixnote.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags (`--vault`, `--config`) and the `PIXNOTE_VAULT` env var
//! 2. Config file (`<vault>/.pixnote/config.yaml`, or the user config dir)
//! 3. Defaults
//!
//! The resolved [`Settings`] struct is plain data passed by reference to the
//! queue and every collaborator at construction time. Nothing caches it
//! process-wide.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Folder name used for the image subfolder when none is configured.
pub const DEFAULT_IMAGE_FOLDER: &str = "Images";

/// Default number of simultaneously processing jobs. Kept low to respect
/// external API rate limits.
pub const DEFAULT_CONCURRENCY: usize = 2;

const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "tiff", "heic", "heif",
];
const DEFAULT_CONVERT_EXTENSIONS: &[&str] = &["heic", "heif"];
const DEFAULT_STABILITY_DELAY_SECS: u64 = 2;
const DEFAULT_CONVERTER_BIN: &str = "heif-convert";

const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant that transcribes photographed and handwritten \
     notes into clean Markdown. Preserve headings, lists and emphasis.";
const DEFAULT_USER_PROMPT: &str =
    "Transcribe all text in this image. Return only the transcription as Markdown.";

/// Raw config file schema (matches the YAML structure).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Vault root to watch
    pub vault: Option<PathBuf>,

    #[serde(default)]
    pub destinations: DestinationsFileConfig,

    /// Simultaneous job limit
    pub concurrency: Option<usize>,

    #[serde(default)]
    pub watcher: WatcherFileConfig,

    /// Processed-history file location
    pub history_file: Option<PathBuf>,

    /// Binary used for container-format conversion
    pub converter_bin: Option<String>,

    #[serde(default)]
    pub compression: CompressionFileConfig,

    #[serde(default)]
    pub provider: ProviderFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationsFileConfig {
    /// Per-location image subfolder name (subfolder mode)
    pub image_folder: Option<String>,
    /// Fixed absolute image folder; wins over `image_folder` when set
    pub image_folder_path: Option<PathBuf>,
    /// Place notes alongside the image's original location (default true)
    pub notes_alongside: Option<bool>,
    /// Fixed absolute note folder; wins over `notes_alongside` when set
    pub note_folder_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatcherFileConfig {
    pub extensions: Option<Vec<String>>,
    pub convert_extensions: Option<Vec<String>>,
    pub stability_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompressionFileConfig {
    pub max_dimension: Option<u32>,
    pub jpeg_quality: Option<u8>,
    pub min_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderFileConfig {
    pub api_base: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Where processed images land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDestination {
    /// A subfolder next to the image's current location
    Subfolder(String),
    /// One fixed absolute folder for the whole vault
    Fixed(PathBuf),
}

/// Where notes land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteDestination {
    /// Alongside the image's original location
    Alongside,
    /// One fixed absolute folder for the whole vault
    Fixed(PathBuf),
}

/// Closed, typed compression options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Longest edge after downscaling
    pub max_dimension: u32,
    /// JPEG re-encode quality (1-100)
    pub jpeg_quality: u8,
    /// Files smaller than this are left alone
    pub min_bytes: u64,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            jpeg_quality: 82,
            min_bytes: 64 * 1024,
        }
    }
}

/// Remote transcription provider settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`
    pub api_base: String,
    /// Name of the env var holding the API key
    pub api_key_env: String,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
            timeout_secs: 120,
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Vault root being watched
    pub vault_root: PathBuf,

    pub image_destination: ImageDestination,
    pub note_destination: NoteDestination,

    /// Simultaneous job limit (>= 1)
    pub concurrency: usize,

    /// Extensions admitted by the watcher/scanner (lowercase, no dot)
    pub extensions: Vec<String>,

    /// Extensions that require format normalization before transcription
    pub convert_extensions: Vec<String>,

    /// Seconds a file must be size-stable before admission
    pub stability_delay_secs: u64,

    /// Processed-history file
    pub history_file: PathBuf,

    /// Binary used by the container-format converter
    pub converter_bin: String,

    pub compression: CompressionOptions,
    pub provider: ProviderSettings,
}

impl Settings {
    /// All-defaults settings for a vault. Handy for tests and `process`.
    pub fn for_vault(vault_root: impl Into<PathBuf>) -> Self {
        let vault_root = vault_root.into();
        let history_file = vault_root.join(".pixnote").join("processed.log");
        Self {
            vault_root,
            image_destination: ImageDestination::Subfolder(DEFAULT_IMAGE_FOLDER.to_string()),
            note_destination: NoteDestination::Alongside,
            concurrency: DEFAULT_CONCURRENCY,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            convert_extensions: DEFAULT_CONVERT_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stability_delay_secs: DEFAULT_STABILITY_DELAY_SECS,
            history_file,
            converter_bin: DEFAULT_CONVERTER_BIN.to_string(),
            compression: CompressionOptions::default(),
            provider: ProviderSettings::default(),
        }
    }

    /// Load settings from an optional explicit config path plus overrides.
    pub fn load(config_path: Option<&Path>, vault_override: Option<PathBuf>) -> Result<Self> {
        let vault_hint = vault_override
            .clone()
            .or_else(|| std::env::var("PIXNOTE_VAULT").ok().map(PathBuf::from));

        let file = match find_config_file(config_path, vault_hint.as_deref()) {
            Some(path) => load_config_file(&path)?,
            None => ConfigFile::default(),
        };

        Self::resolve(file, vault_hint)
    }

    /// Combine a parsed config file with overrides into resolved settings.
    pub fn resolve(file: ConfigFile, vault_override: Option<PathBuf>) -> Result<Self> {
        let vault_root = vault_override
            .or(file.vault)
            .context("No vault configured: pass --vault, set PIXNOTE_VAULT, or add `vault:` to the config file")?;

        let mut settings = Self::for_vault(vault_root);

        if let Some(path) = file.destinations.image_folder_path {
            settings.image_destination = ImageDestination::Fixed(path);
        } else if let Some(name) = file.destinations.image_folder {
            settings.image_destination = ImageDestination::Subfolder(name);
        }

        if let Some(path) = file.destinations.note_folder_path {
            settings.note_destination = NoteDestination::Fixed(path);
        } else if file.destinations.notes_alongside == Some(false) {
            // Alongside disabled but no fixed folder given: notes land in the
            // vault root.
            settings.note_destination = NoteDestination::Fixed(settings.vault_root.clone());
        }

        if let Some(n) = file.concurrency {
            settings.concurrency = n.max(1);
        }
        if let Some(exts) = file.watcher.extensions {
            settings.extensions = lowercase_all(exts);
        }
        if let Some(exts) = file.watcher.convert_extensions {
            settings.convert_extensions = lowercase_all(exts);
        }
        if let Some(secs) = file.watcher.stability_delay_secs {
            settings.stability_delay_secs = secs;
        }
        if let Some(path) = file.history_file {
            settings.history_file = path;
        }
        if let Some(bin) = file.converter_bin {
            settings.converter_bin = bin;
        }

        let c = file.compression;
        if let Some(v) = c.max_dimension {
            settings.compression.max_dimension = v;
        }
        if let Some(v) = c.jpeg_quality {
            settings.compression.jpeg_quality = v.clamp(1, 100);
        }
        if let Some(v) = c.min_bytes {
            settings.compression.min_bytes = v;
        }

        let p = file.provider;
        if let Some(v) = p.api_base {
            settings.provider.api_base = v;
        }
        if let Some(v) = p.api_key_env {
            settings.provider.api_key_env = v;
        }
        if let Some(v) = p.model {
            settings.provider.model = v;
        }
        if let Some(v) = p.system_prompt {
            settings.provider.system_prompt = v;
        }
        if let Some(v) = p.user_prompt {
            settings.provider.user_prompt = v;
        }
        if let Some(v) = p.timeout_secs {
            settings.provider.timeout_secs = v;
        }

        Ok(settings)
    }

    /// Whether a path carries one of the watched image extensions.
    pub fn is_watched_file(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.extensions.iter().any(|e| e == &ext))
            .unwrap_or(false)
    }

    /// Whether a path's format needs normalization before transcription.
    pub fn needs_conversion(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.convert_extensions.iter().any(|e| e == &ext))
            .unwrap_or(false)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn lowercase_all(exts: Vec<String>) -> Vec<String> {
    exts.into_iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// Find the config file: explicit path, then the vault's `.pixnote/`
/// directory, then the user config dir.
fn find_config_file(explicit: Option<&Path>, vault_hint: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(vault) = vault_hint {
        let candidate = vault.join(".pixnote").join("config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = dirs::config_dir()?.join("pixnote").join("config.yaml");
    candidate.exists().then_some(candidate)
}

/// Load and parse a config file.
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
