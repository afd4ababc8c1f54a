//! Run configuration for indexing and searching, plus the optional TOML settings file
//!
//! Values come from three layers: built-in defaults, a `face-finder.toml` file, and
//! command-line flags. Each layer overrides the one before it.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use face_finder_embed::{DetectionModel, EmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store file used when nothing else is configured
pub const DEFAULT_DB_FILE: &str = "photo_face_index.db";

/// Maximum face distance still counted as the same person
pub const DEFAULT_TOLERANCE: f64 = 0.6;

/// Settings file looked up in the working directory
pub const SETTINGS_FILE: &str = "face-finder.toml";

/// Image extensions every provider is expected to decode
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// HEIC/HEIF family, only scanned when the provider can decode it
pub const EXTENDED_IMAGE_EXTENSIONS: &[&str] = &["heic", "heif"];

/// One worker per available CPU
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Reject tolerances outside the open interval (0, 1)
pub fn check_tolerance(tolerance: f64) -> std::result::Result<f64, ConfigError> {
    if tolerance > 0.0 && tolerance < 1.0 {
        Ok(tolerance)
    } else {
        Err(ConfigError::InvalidTolerance(tolerance))
    }
}

/// Everything one indexing run needs to know.
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// SQLite store file
    pub store_path: PathBuf,
    /// Directories scanned recursively, in order
    pub roots: Vec<PathBuf>,
    /// Reprocess every discovered file, ignoring the stored snapshot
    pub force_rescan: bool,
    /// Number of parallel workers
    pub max_workers: usize,
    /// Face detector handed to every worker
    pub detection_model: DetectionModel,
    /// Also scan HEIC/HEIF files, even if the provider does not advertise support
    pub extended_formats: bool,
}

impl IndexingConfig {
    pub fn new(store_path: impl Into<PathBuf>, roots: Vec<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            roots,
            force_rescan: false,
            max_workers: default_workers(),
            detection_model: DetectionModel::default(),
            extended_formats: false,
        }
    }

    pub fn with_force_rescan(mut self, force_rescan: bool) -> Self {
        self.force_rescan = force_rescan;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_detection_model(mut self, model: DetectionModel) -> Self {
        self.detection_model = model;
        self
    }

    pub fn with_extended_formats(mut self, extended_formats: bool) -> Self {
        self.extended_formats = extended_formats;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Lower-case extensions to scan, given whether the provider decodes HEIC/HEIF.
    pub fn supported_extensions(&self, provider_extended: bool) -> Vec<&'static str> {
        let mut extensions = IMAGE_EXTENSIONS.to_vec();
        if provider_extended || self.extended_formats {
            extensions.extend_from_slice(EXTENDED_IMAGE_EXTENSIONS);
        }
        extensions
    }
}

/// Everything one search run needs to know.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub store_path: PathBuf,
    /// Photo of the person to look for
    pub reference_image: PathBuf,
    /// Inclusive distance threshold, strictly between 0 and 1
    pub tolerance: f64,
    pub detection_model: DetectionModel,
}

impl SearchConfig {
    pub fn new(store_path: impl Into<PathBuf>, reference_image: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            reference_image: reference_image.into(),
            tolerance: DEFAULT_TOLERANCE,
            detection_model: DetectionModel::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_detection_model(mut self, model: DetectionModel) -> Self {
        self.detection_model = model;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_tolerance(self.tolerance)?;
        Ok(())
    }
}

/// Contents of a `face-finder.toml` file. Every field is optional.
///
/// ```toml
/// database = "/var/lib/face-finder/photos.db"
/// workers = 4
/// tolerance = 0.55
/// detection_model = "cnn"
///
/// [provider]
/// command = "/usr/local/bin/face-embed"
/// num_jitters = 2
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub database: Option<PathBuf>,
    pub workers: Option<usize>,
    pub tolerance: Option<f64>,
    pub detection_model: Option<DetectionModel>,
    pub provider: Option<EmbedConfig>,
}

impl FileSettings {
    /// Parse settings from TOML text
    pub fn parse(text: &str) -> std::result::Result<Self, ConfigError> {
        let settings: FileSettings =
            toml::from_str(text).map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        if let Some(tolerance) = settings.tolerance {
            check_tolerance(tolerance)?;
        }
        if settings.workers == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        Ok(settings)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings = Self::parse(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load an explicitly named file, or `face-finder.toml` from the working directory if
    /// present, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let default_path = Path::new(SETTINGS_FILE);
        if default_path.is_file() {
            return Self::from_file(default_path);
        }
        Ok(Self::default())
    }

    /// Store path from the file, or the built-in default
    pub fn database_or_default(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }

    /// Provider settings from the file, or the built-in default
    pub fn provider_or_default(&self) -> EmbedConfig {
        self.provider.clone().unwrap_or_default()
    }
}
