//! In-memory provider with scripted answers, keyed by file name
//!
//! Used by tests and dry runs where no face recognition backend is installed. The file
//! must still exist on disk, so callers exercise the same missing-file paths as with a
//! real provider.

use crate::config::DetectionModel;
use crate::error::{EmbedError, Result};
use crate::face::{BoundingBox, FaceDetection, FaceEmbedding};
use crate::provider::FaceEmbeddingProvider;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct StaticProvider {
    faces: HashMap<String, Vec<FaceDetection>>,
    failures: HashMap<String, String>,
    extended_formats: bool,
    calls: Mutex<Vec<(PathBuf, DetectionModel)>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `file_name` with the given detections
    pub fn with_faces(mut self, file_name: impl Into<String>, faces: Vec<FaceDetection>) -> Self {
        self.faces.insert(file_name.into(), faces);
        self
    }

    /// Answer `file_name` with one detection per embedding, boxes laid out left to right
    pub fn with_embeddings(
        self,
        file_name: impl Into<String>,
        embeddings: Vec<FaceEmbedding>,
    ) -> Self {
        let faces = embeddings
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| {
                let left = i as i32 * 100;
                FaceDetection::new(BoundingBox::new(0, left + 80, 80, left), embedding)
            })
            .collect();
        self.with_faces(file_name, faces)
    }

    /// Fail every request for `file_name` as an unreadable image
    pub fn with_failure(mut self, file_name: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(file_name.into(), message.into());
        self
    }

    pub fn with_extended_formats(mut self, extended_formats: bool) -> Self {
        self.extended_formats = extended_formats;
        self
    }

    /// Every request seen so far, in arrival order
    pub fn calls(&self) -> Vec<(PathBuf, DetectionModel)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// How many times `path` was requested
    pub fn call_count(&self, path: &Path) -> usize {
        self.calls().iter().filter(|(p, _)| p == path).count()
    }
}

#[async_trait]
impl FaceEmbeddingProvider for StaticProvider {
    async fn detect_and_embed(
        &self,
        image: &Path,
        model: DetectionModel,
    ) -> Result<Vec<FaceDetection>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((image.to_path_buf(), model));

        if !tokio::fs::try_exists(image).await? {
            return Err(EmbedError::ImageNotFound {
                path: image.to_path_buf(),
            });
        }

        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(message) = self.failures.get(&name) {
            return Err(EmbedError::UnreadableImage {
                path: image.to_path_buf(),
                message: message.clone(),
            });
        }

        Ok(self.faces.get(&name).cloned().unwrap_or_default())
    }

    fn supports_extended_formats(&self) -> bool {
        self.extended_formats
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}
