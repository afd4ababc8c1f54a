//! Find the photos that contain the person in a reference image
//!
//! Every stored face is compared with the first face the provider finds in the reference
//! image. A file matches when any of its faces is within the tolerance, so each file
//! appears at most once. Results come back sorted by path.
//!
//! When the reference image holds several faces, the provider's detection order decides
//! which one is used. That order belongs to the provider and may differ between
//! implementations.

use crate::config::SearchConfig;
use crate::error::ConfigError;
use crate::status::{SearchOutcome, StatusEvent, StatusSender};
use crate::storage::FaceStore;
use crate::storage::sqlite_store::SqliteFaceStore;
use anyhow::{Result, anyhow};
use face_finder_embed::{FaceEmbedding, FaceEmbeddingProvider};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Paths of every file with at least one face within `tolerance` of `reference`.
///
/// The threshold is inclusive, and the result is deduplicated and sorted by the path's
/// string form. Any tolerance is accepted here, including 0.
pub fn matching_paths<'a>(
    known: impl IntoIterator<Item = (&'a Path, &'a FaceEmbedding)>,
    reference: &FaceEmbedding,
    tolerance: f64,
) -> Vec<PathBuf> {
    let matched: BTreeSet<String> = known
        .into_iter()
        .filter(|(_, embedding)| embedding.euclidean_distance(reference) <= tolerance)
        .map(|(path, _)| path.to_string_lossy().into_owned())
        .collect();
    matched.into_iter().map(PathBuf::from).collect()
}

/// Runs one search against the face index.
pub struct FaceMatcher {
    config: SearchConfig,
    provider: Arc<dyn FaceEmbeddingProvider>,
    status: StatusSender,
}

impl FaceMatcher {
    pub fn new(
        config: SearchConfig,
        provider: Arc<dyn FaceEmbeddingProvider>,
        status: StatusSender,
    ) -> Self {
        Self {
            config,
            provider,
            status,
        }
    }

    /// Check the configuration, open the existing store and search it.
    pub async fn run(&self) -> Result<SearchOutcome> {
        if let Err(e) = self.check_config() {
            self.status.error(e.to_string());
            self.status.aborted(e.to_string());
            return Err(e.into());
        }

        self.status.info(format!(
            "Using database: {}",
            self.config.store_path.display()
        ));
        self.status.info(format!(
            "Using reference image: {}",
            self.config.reference_image.display()
        ));
        self.status.info(format!(
            "Using matching tolerance: {}",
            self.config.tolerance
        ));

        let store = match SqliteFaceStore::open_existing(&self.config.store_path).await {
            Ok(store) => store,
            Err(e) => {
                if let Some(missing @ ConfigError::StoreNotFound(_)) =
                    e.downcast_ref::<ConfigError>()
                {
                    self.status.error(missing.to_string());
                    self.status.aborted(missing.to_string());
                } else {
                    self.abort(&format!("Database error: {e:#}"));
                }
                return Err(e);
            }
        };

        let result = self.search_with_store(&store).await;
        store.close().await;
        result
    }

    fn check_config(&self) -> std::result::Result<(), ConfigError> {
        self.config.validate()?;
        if !self.config.reference_image.is_file() {
            return Err(ConfigError::ReferenceImageNotFound(
                self.config.reference_image.clone(),
            ));
        }
        Ok(())
    }

    /// Search an already opened store. The tolerance is used as given.
    pub async fn search_with_store(&self, store: &dyn FaceStore) -> Result<SearchOutcome> {
        let start = Instant::now();

        let rows = match store.load_embeddings().await {
            Ok(rows) => rows,
            Err(e) => {
                self.abort(&format!("Database error reading encodings: {e:#}"));
                return Err(e);
            }
        };

        if rows.is_empty() {
            self.status.warning(format!(
                "Database '{}' appears to be empty. No faces indexed.",
                self.config.store_path.display()
            ));
            self.status
                .warning("No faces loaded from DB to compare against.");
            self.status.completed();
            return Ok(SearchOutcome {
                elapsed_secs: start.elapsed().as_secs_f64(),
                ..SearchOutcome::default()
            });
        }

        let mut known = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.decode() {
                Ok(embedding) => known.push((row.file_path.as_path(), embedding)),
                Err(e) => self.status.warning(format!(
                    "Skipping invalid encoding for {}: {}",
                    row.file_path.display(),
                    e
                )),
            }
        }
        if known.is_empty() {
            let message = "No valid encodings were loaded from the database.";
            self.abort(message);
            return Err(anyhow!(message));
        }
        self.status.info(format!(
            "Loaded {} known face encodings from the database.",
            known.len()
        ));

        let reference = &self.config.reference_image;
        self.status.info("Processing reference image...");
        let faces = match self
            .provider
            .detect_and_embed(reference, self.config.detection_model)
            .await
        {
            Ok(faces) => faces,
            Err(e) => {
                let message = format!("loading or processing reference image: {e}");
                self.status.error(&message);
                self.status.aborted(message);
                return Err(e.into());
            }
        };

        let reference_faces = faces.len();
        let Some(chosen) = faces.into_iter().next() else {
            let message = format!(
                "No faces found in the reference image '{}'.",
                reference.display()
            );
            self.status.error(&message);
            self.status.aborted(&message);
            return Err(anyhow!(message));
        };
        if reference_faces == 1 {
            self.status
                .info("Found 1 face in reference image. Using it for searching.");
        } else {
            warn!(
                "{} faces in reference image {}, using the first",
                reference_faces,
                reference.display()
            );
            self.status.warning(format!(
                "Found {reference_faces} faces in reference image. Using the first one."
            ));
        }
        debug!("Reference face at {}", chosen.bounding_box);

        self.status
            .info("Comparing reference face against database...");
        let matches = matching_paths(
            known.iter().map(|(path, embedding)| (*path, embedding)),
            &chosen.embedding,
            self.config.tolerance,
        );
        let elapsed_secs = start.elapsed().as_secs_f64();
        self.status
            .info(format!("Comparison finished in {elapsed_secs:.2} seconds."));

        if matches.is_empty() {
            self.status.info(format!(
                "No matches found with tolerance {}.",
                self.config.tolerance
            ));
        } else {
            self.status.info(format!(
                "Found {} photos containing a matching face:",
                matches.len()
            ));
            for path in &matches {
                self.status.send(StatusEvent::Match { path: path.clone() });
            }
        }
        info!(
            "Search compared {} faces, {} matching files",
            known.len(),
            matches.len()
        );
        self.status.completed();

        Ok(SearchOutcome {
            faces_compared: known.len(),
            matches,
            reference_faces,
            elapsed_secs,
        })
    }

    fn abort(&self, message: &str) {
        tracing::error!("{}", message);
        self.status.fatal(message);
        self.status.aborted(message);
    }
}
