//! Face embedding provider implementations

use crate::config::{DetectionModel, EmbedConfig};
use crate::error::{EmbedError, Result};
use crate::face::{BoundingBox, FaceDetection, FaceEmbedding};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Something that can find faces in a photo and describe each one as an embedding.
///
/// Implementations must be safe to call from many tasks at once; the indexer fans
/// images out to a pool of workers that share a single provider.
#[async_trait]
pub trait FaceEmbeddingProvider: Send + Sync {
    /// Detect every face in `image` using `model`, returning one detection per face.
    ///
    /// An image without faces is not an error and yields an empty vector.
    async fn detect_and_embed(
        &self,
        image: &Path,
        model: DetectionModel,
    ) -> Result<Vec<FaceDetection>>;

    /// Whether HEIC/HEIF photos can be decoded
    fn supports_extended_formats(&self) -> bool {
        false
    }

    /// Get the provider name
    fn provider_name(&self) -> &str;
}

/// Wire format printed on stdout by the external command.
#[derive(Debug, Deserialize)]
struct CommandOutput {
    locations: Vec<[i32; 4]>,
    encodings: Vec<Vec<f64>>,
}

/// Runs an external executable once per image and reads detections from its stdout.
///
/// The command is invoked as
/// `<command> <args..> --detection-model <hog|cnn> --encoding-model <small|large> --jitters <n> <image>`
/// and must print `{"locations": [[top, right, bottom, left], ..], "encodings": [[f64; 128], ..]}`.
/// A non-zero exit status means the image could not be read; stderr becomes the message.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    config: EmbedConfig,
    name: String,
}

impl CommandProvider {
    /// Create a provider after validating the configuration
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let name = format!("command:{}", config.command.display());
        Ok(Self { config, name })
    }

    fn build_command(&self, image: &Path, model: DetectionModel) -> Command {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg("--detection-model")
            .arg(model.as_str())
            .arg("--encoding-model")
            .arg(self.config.encoding_model.as_str())
            .arg("--jitters")
            .arg(self.config.num_jitters.to_string())
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl FaceEmbeddingProvider for CommandProvider {
    async fn detect_and_embed(
        &self,
        image: &Path,
        model: DetectionModel,
    ) -> Result<Vec<FaceDetection>> {
        match tokio::fs::metadata(image).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EmbedError::ImageNotFound {
                    path: image.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let child = self
            .build_command(image, model)
            .spawn()
            .map_err(|source| EmbedError::ProviderLaunch {
                command: self.config.command.display().to_string(),
                source,
            })?;

        let output = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| EmbedError::Timeout {
                    path: image.to_path_buf(),
                    seconds: limit.as_secs_f64(),
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("provider exited with {}", output.status)
            } else {
                stderr
            };
            debug!("Provider rejected {}: {}", image.display(), message);
            return Err(EmbedError::UnreadableImage {
                path: image.to_path_buf(),
                message,
            });
        }

        let detections = parse_detections(&output.stdout)?;
        debug!(
            "Provider found {} face(s) in {} using {}",
            detections.len(),
            image.display(),
            model
        );
        Ok(detections)
    }

    fn supports_extended_formats(&self) -> bool {
        self.config.extended_formats
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

/// Parse the JSON document printed by a provider command.
///
/// Locations and encodings are paired by position, so the two lists must have the
/// same length and every encoding must have the full embedding dimension.
pub fn parse_detections(stdout: &[u8]) -> Result<Vec<FaceDetection>> {
    let output: CommandOutput = serde_json::from_slice(stdout).map_err(|e| {
        let preview: String = String::from_utf8_lossy(stdout).chars().take(120).collect();
        warn!("Unparseable provider output: {}", preview);
        EmbedError::protocol(e.to_string())
    })?;

    if output.locations.len() != output.encodings.len() {
        return Err(EmbedError::EncodingMismatch {
            locations: output.locations.len(),
            encodings: output.encodings.len(),
        });
    }

    output
        .locations
        .into_iter()
        .zip(output.encodings)
        .map(|(location, encoding)| {
            Ok(FaceDetection::new(
                BoundingBox::from(location),
                FaceEmbedding::new(encoding)?,
            ))
        })
        .collect()
}
