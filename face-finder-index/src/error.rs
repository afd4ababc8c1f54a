//! Configuration errors, reported before a run does any work

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Tolerance must be strictly between 0 and 1, got {0}")]
    InvalidTolerance(f64),

    #[error("At least one worker is required")]
    NoWorkers,

    #[error("No directories to index")]
    NoRoots,

    #[error("Database file '{}' not found. Please run the indexer first.", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Reference image not found at '{}'", .0.display())]
    ReferenceImageNotFound(PathBuf),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}
