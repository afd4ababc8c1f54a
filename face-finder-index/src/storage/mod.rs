//! Persistent face index
//!
//! The store maps photo paths to the faces found in them. Each file's rows are only ever
//! replaced as a whole: [`FaceStore::replace_file_faces`] deletes everything recorded for
//! a path and inserts the latest pass in one transaction, so old and new detections never
//! coexist.
//!
//! ## Tables
//!
//! ```text
//! faces(id, file_path, last_modified, face_encoding, face_location_css)   one row per face
//! scanned_files(file_path, last_modified, face_count)                     one row per successful pass
//! ```
//!
//! `scanned_files` lets a photo without faces count as indexed. Without it such a photo
//! leaves no row behind and would be reprocessed on every run.

use anyhow::Result;
use async_trait::async_trait;
use face_finder_embed::{BoundingBox, FaceDetection, FaceEmbedding};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub mod sqlite_store;

/// Per-file latest modification time known to the store.
pub type IndexedSnapshot = HashMap<PathBuf, f64>;

/// One stored face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRecord {
    pub file_path: PathBuf,
    /// File modification time captured when the file was processed
    pub last_modified: f64,
    pub embedding: FaceEmbedding,
    /// `None` for rows written without a location
    pub bounding_box: Option<BoundingBox>,
}

/// A raw embedding row, exactly as stored.
///
/// Decoding is left to the caller so that one malformed row can be skipped without
/// failing the whole load.
#[derive(Debug, Clone)]
pub struct StoredFace {
    pub file_path: PathBuf,
    pub encoding: Vec<u8>,
}

impl StoredFace {
    pub fn decode(&self) -> face_finder_embed::Result<FaceEmbedding> {
        FaceEmbedding::from_bytes(&self.encoding)
    }
}

/// The successful result of processing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub last_modified: f64,
    /// Empty when the photo has no faces
    pub faces: Vec<FaceDetection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Rows in `faces`
    pub face_rows: usize,
    /// Distinct paths with at least one face
    pub files_with_faces: usize,
    /// Paths whose latest pass found no face
    pub files_without_faces: usize,
}

/// One indexed file, as listed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedFile {
    pub file_path: PathBuf,
    pub face_count: usize,
    pub last_modified: f64,
}

#[async_trait]
pub trait FaceStore: Send + Sync {
    /// Latest known modification time for every indexed path
    async fn snapshot(&self) -> Result<IndexedSnapshot>;

    /// Atomically replace everything stored for `path`.
    ///
    /// `Some` records a successful pass (possibly with zero faces); `None` records a
    /// failed pass, which leaves the path with no rows so that it is retried next run.
    /// Returns the number of faces inserted.
    async fn replace_file_faces(&self, path: &Path, outcome: Option<&ProcessedFile>)
    -> Result<usize>;

    /// Every stored face with its path, in insertion order
    async fn load_embeddings(&self) -> Result<Vec<StoredFace>>;

    /// Decoded faces stored for one path
    async fn face_records(&self, path: &Path) -> Result<Vec<FaceRecord>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Indexed files sorted by path, including files without faces
    async fn list_files(&self, limit: usize) -> Result<Vec<IndexedFile>>;
}

/// Path as stored in the `file_path` columns
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
