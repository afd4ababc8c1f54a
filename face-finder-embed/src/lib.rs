//! # face-finder-embed
//!
//! Face detection and identity embeddings behind a small async trait. The indexer and
//! the searcher only ever talk to [`FaceEmbeddingProvider`]; which backend actually
//! finds the faces is a deployment decision.
//!
//! ## Providers
//!
//! - [`CommandProvider`]: runs an external face recognition program once per image
//!   and reads JSON detections from its stdout
//! - [`StaticProvider`]: scripted answers keyed by file name, for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use face_finder_embed::{CommandProvider, DetectionModel, EmbedConfig, FaceEmbeddingProvider};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = CommandProvider::new(EmbedConfig::with_command("/usr/local/bin/face-embed"))?;
//! let faces = provider
//!     .detect_and_embed(Path::new("holiday.jpg"), DetectionModel::Hog)
//!     .await?;
//!
//! for face in &faces {
//!     println!("face at {}", face.bounding_box);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Embeddings
//!
//! Every [`FaceEmbedding`] has exactly [`EMBEDDING_DIMENSION`] components. Two faces
//! belong to the same person when their Euclidean distance is at or below a
//! tolerance, typically 0.6.

pub mod config;
pub mod error;
pub mod face;
pub mod provider;
pub mod static_provider;

// Re-export main types for easy access
pub use config::{DetectionModel, EmbedConfig, EmbedConfigBuilder, EncodingModel};
pub use error::{EmbedError, Result};
pub use face::{BoundingBox, EMBEDDING_BYTES, EMBEDDING_DIMENSION, FaceDetection, FaceEmbedding};
pub use provider::{CommandProvider, FaceEmbeddingProvider, parse_detections};
pub use static_provider::StaticProvider;
