use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One message from a background run to whoever is watching it.
///
/// A run emits any interleaving of the non-terminal kinds and finishes with exactly one
/// of [`StatusEvent::Completed`] or [`StatusEvent::Aborted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Info { message: String },
    Warning { message: String },
    Error { message: String },
    Fatal { message: String },
    /// A file finished processing; `percent` counts completed files against the run total
    Progress { percent: f64, item: String },
    /// A file containing a matching face
    Match { path: PathBuf },
    Completed,
    Aborted { reason: String },
}

impl StatusEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Progress after `completed` of `total` files, labelled with the file's display name.
    pub fn progress(completed: usize, total: usize, item: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self::Progress {
            percent,
            item: item.into(),
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted { .. })
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info { message } => write!(f, "INFO: {message}"),
            Self::Warning { message } => write!(f, "WARN: {message}"),
            Self::Error { message } => write!(f, "ERROR: {message}"),
            Self::Fatal { message } => write!(f, "FATAL: {message}"),
            Self::Progress { percent, item } => write!(f, "[{percent:5.1}%] {item}"),
            Self::Match { path } => write!(f, "{}", path.display()),
            Self::Completed => write!(f, "DONE"),
            Self::Aborted { reason } => write!(f, "ABORTED: {reason}"),
        }
    }
}

/// Counters for one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingSummary {
    /// Image files discovered under the roots
    pub files_found: usize,
    /// Files selected for processing after change detection
    pub files_to_process: usize,
    /// Files whose result was committed, with or without faces
    pub files_processed: usize,
    /// Committed files that contained at least one face
    pub files_with_faces: usize,
    /// Face records inserted during this run
    pub faces_stored: usize,
    /// Files already current in the index
    pub files_skipped: usize,
    /// Files the provider could not handle
    pub processing_errors: usize,
    /// Files whose replace transaction failed
    pub database_errors: usize,
    /// Files that vanished or could not be inspected before processing
    pub check_errors: usize,
    pub elapsed_secs: f64,
}

impl IndexingSummary {
    /// Human-readable report, one line per counter
    pub fn report_lines(&self) -> Vec<String> {
        vec![
            "--- Indexing Summary ---".to_string(),
            format!("Total potential image files found: {}", self.files_found),
            format!("Files checked for processing: {}", self.files_to_process),
            format!(
                "Files successfully processed: {} ({} with faces)",
                self.files_processed, self.files_with_faces
            ),
            format!("Total face embeddings stored in this run: {}", self.faces_stored),
            format!("Files skipped (unchanged): {}", self.files_skipped),
            format!("Files with processing errors: {}", self.processing_errors),
            format!("Database update errors: {}", self.database_errors),
            format!("Check/Stat errors before processing: {}", self.check_errors),
            format!("Total execution time: {:.2} seconds.", self.elapsed_secs),
        ]
    }

    /// Total of every per-file failure class
    pub fn error_count(&self) -> usize {
        self.processing_errors + self.database_errors + self.check_errors
    }
}

/// Result of one search run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Distinct matching files, sorted
    pub matches: Vec<PathBuf>,
    /// Stored faces compared against the reference
    pub faces_compared: usize,
    /// Faces the provider found in the reference image
    pub reference_faces: usize,
    pub elapsed_secs: f64,
}
