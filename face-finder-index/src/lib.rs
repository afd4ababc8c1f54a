//! face-finder-index: incremental face indexing and search over a photo collection
//!
//! This crate keeps a SQLite index of the faces found in a set of photo directories and
//! answers "which photos contain this person?" by comparing face embeddings. Detection
//! itself is delegated to a [`face_finder_embed::FaceEmbeddingProvider`].
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: directory scanning, change detection, the indexing engine and the matcher
//! - **[`storage`]**: the face store trait and its SQLite implementation
//! - **[`status`]**: status events streamed from a run to its observer
//! - **[`config`]**: run configuration and the optional TOML settings file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use face_finder_embed::{CommandProvider, EmbedConfig};
//! use face_finder_index::config::{IndexingConfig, SearchConfig};
//! use face_finder_index::retrieval::{indexing_engine::IndexingEngine, matcher::FaceMatcher};
//! use face_finder_index::status::status_channel;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = Arc::new(CommandProvider::new(EmbedConfig::default())?);
//! let (status, events) = status_channel();
//!
//! let config = IndexingConfig::new("photo_face_index.db", vec![PathBuf::from("/photos")]);
//! IndexingEngine::new(config, provider.clone(), status.clone()).run().await?;
//!
//! let search = SearchConfig::new("photo_face_index.db", "me.jpg").with_tolerance(0.5);
//! let outcome = FaceMatcher::new(search, provider, status).run().await?;
//! for path in &outcome.matches {
//!     println!("{}", path.display());
//! }
//! # drop(events);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! DirectoryScanner → ChangeDetector → IndexingEngine ⇄ workers → FaceEmbeddingProvider
//!                                          ↓
//!                                    SqliteFaceStore ← FaceMatcher ← reference image
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod status;
pub mod storage;

pub use error::ConfigError;
