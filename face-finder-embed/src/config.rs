//! Configuration for face detection providers

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Face detector used to locate faces before encoding them.
///
/// This is a per-run choice passed explicitly into every detection call; there is no
/// process-wide "current model".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    /// Histogram-of-oriented-gradients detector. Fast on CPU, misses small or angled faces.
    #[default]
    Hog,
    /// Convolutional detector. More accurate, much slower without a GPU.
    Cnn,
}

impl DetectionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionModel::Hog => "hog",
            DetectionModel::Cnn => "cnn",
        }
    }
}

impl std::fmt::Display for DetectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetectionModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hog" => Ok(DetectionModel::Hog),
            "cnn" => Ok(DetectionModel::Cnn),
            _ => Err(format!(
                "Invalid detection model: '{s}'. Valid values are: hog, cnn"
            )),
        }
    }
}

/// Landmark model used by the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingModel {
    /// 5-point landmarks, faster
    Small,
    /// 68-point landmarks, more accurate
    #[default]
    Large,
}

impl EncodingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingModel::Small => "small",
            EncodingModel::Large => "large",
        }
    }
}

impl std::fmt::Display for EncodingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EncodingModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" => Ok(EncodingModel::Small),
            "large" => Ok(EncodingModel::Large),
            _ => Err(format!(
                "Invalid encoding model: '{s}'. Valid values are: small, large"
            )),
        }
    }
}

/// Configuration for the external face embedding command.
///
/// # Example
///
/// ```
/// use face_finder_embed::{EmbedConfig, EncodingModel};
///
/// let config = EmbedConfig::builder()
///     .command("/usr/local/bin/face-embed")
///     .num_jitters(2u32)
///     .encoding_model(EncodingModel::Small)
///     .build()
///     .unwrap();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(default)]
pub struct EmbedConfig {
    /// Executable invoked once per image
    #[builder(default = r#"PathBuf::from("face-embed")"#)]
    pub command: PathBuf,
    /// Extra arguments placed before the generated ones
    #[builder(default)]
    pub args: Vec<String>,
    /// Landmark model for encoding
    #[builder(default)]
    pub encoding_model: EncodingModel,
    /// How many times to re-sample each face when encoding. Higher is slower and more accurate.
    #[builder(default = "1")]
    pub num_jitters: u32,
    /// Whether the command can decode HEIC/HEIF photos
    #[builder(default)]
    pub extended_formats: bool,
    /// Per-image time limit in seconds
    #[builder(default)]
    pub timeout_secs: Option<f64>,
}

impl EmbedConfig {
    /// Create a new configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Configuration running `command` with every other setting at its default.
    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Set the number of jitters (builder style)
    pub fn with_jitters(self, num_jitters: u32) -> Self {
        Self {
            num_jitters,
            ..self
        }
    }

    /// Enable or disable HEIC/HEIF support (builder style)
    pub fn with_extended_formats(self, extended_formats: bool) -> Self {
        Self {
            extended_formats,
            ..self
        }
    }

    /// Per-image timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Check that the settings can produce a working provider
    pub fn validate(&self) -> Result<()> {
        if self.command.as_os_str().is_empty() {
            return Err(EmbedError::invalid_config("Provider command cannot be empty"));
        }
        if self.num_jitters == 0 {
            return Err(EmbedError::invalid_config("num_jitters must be at least 1"));
        }
        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(EmbedError::invalid_config(format!(
                    "timeout_secs must be a positive, representable number of seconds, got {secs}"
                )));
            }
        }
        tracing::debug!("Provider configuration valid: {}", self.command.display());
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("face-embed"),
            args: Vec::new(),
            encoding_model: EncodingModel::default(),
            num_jitters: 1,
            extended_formats: false,
            timeout_secs: None,
        }
    }
}
