//! Error types for face detection and embedding

use std::path::PathBuf;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Everything that can go wrong while turning an image into face embeddings.
///
/// The indexing core never propagates these past a single file: any variant returned
/// while processing a photo becomes a per-file processing error. Only the search path
/// treats a provider failure as fatal, because a search cannot proceed without its
/// reference face.
///
/// # Error Categories
///
/// - **Input errors**: the image is missing, unreadable or corrupt
/// - **Model errors**: the detector and encoder disagree, or produce a malformed vector
/// - **Provider errors**: the external process could not start, timed out, or spoke garbage
/// - **Configuration errors**: invalid provider settings
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The image vanished or never existed
    #[error("Image not found: {path}")]
    ImageNotFound { path: PathBuf },

    /// The image could not be decoded (unsupported format, truncated file, ...)
    #[error("Could not load image {path}: {message}")]
    UnreadableImage { path: PathBuf, message: String },

    /// The encoder returned a different number of vectors than there were detections
    #[error("Found {locations} face locations but {encodings} encodings")]
    EncodingMismatch { locations: usize, encodings: usize },

    /// An embedding did not have the expected dimension
    #[error("Invalid embedding length {len}, expected {expected}")]
    InvalidEmbedding { len: usize, expected: usize },

    /// Error when provider configuration is invalid
    #[error("Invalid provider configuration: {message}")]
    InvalidConfig { message: String },

    /// The external provider process could not be started
    #[error("Failed to launch provider command {command}: {source}")]
    ProviderLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The external provider produced output that could not be understood
    #[error("Provider returned malformed output: {message}")]
    ProviderProtocol { message: String },

    /// The provider took longer than the configured limit for one image
    #[error("Provider timed out after {seconds:.1}s on {path}")]
    Timeout { path: PathBuf, seconds: f64 },

    /// IO errors when reading image metadata
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a protocol error for unexpected provider output.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::ProviderProtocol {
            message: message.into(),
        }
    }

    /// Whether the failure is about the input image itself rather than the provider.
    ///
    /// Used for log levels only: a corrupt photo is routine, a provider that cannot
    /// start is worth shouting about.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ImageNotFound { .. } | Self::UnreadableImage { .. }
        )
    }

    /// Whether the provider cannot work at all, whatever the image.
    pub fn is_environment_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderLaunch { .. } | Self::InvalidConfig { .. }
        )
    }
}
