//! Recursive discovery of image files under the configured roots

use crate::status::StatusSender;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Finds photos by extension. Nothing is opened or read besides directory listings.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    roots: Vec<PathBuf>,
    extensions: HashSet<String>,
}

impl DirectoryScanner {
    pub fn new<'e>(roots: Vec<PathBuf>, extensions: impl IntoIterator<Item = &'e str>) -> Self {
        Self {
            roots,
            extensions: extensions.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Whether the lower-cased extension of `path` is one we scan
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    /// Lazily walk every root and yield absolute paths of supported files.
    ///
    /// Roots that are missing or not directories produce a warning event and are skipped.
    /// Hidden files and ignore files are not special: every file under a root is a candidate.
    /// Symbolic links to files are yielded under the link's own path.
    pub fn scan<'a>(&'a self, status: &'a StatusSender) -> impl Iterator<Item = PathBuf> + 'a {
        self.roots
            .iter()
            .filter_map(move |root| Self::resolve_root(root, status))
            .flat_map(move |root| {
                ignore::WalkBuilder::new(root)
                    .standard_filters(false)
                    .follow_links(false)
                    .build()
                    .filter_map(move |entry| match entry {
                        Ok(entry) => {
                            // Links to files count; links to directories are not descended
                            let is_file = entry.file_type().is_some_and(|t| {
                                t.is_file() || (t.is_symlink() && entry.path().is_file())
                            });
                            (is_file && self.is_supported(entry.path()))
                                .then(|| entry.into_path())
                        }
                        Err(e) => {
                            debug!("Skipping unreadable directory entry: {}", e);
                            None
                        }
                    })
            })
    }

    fn resolve_root(root: &Path, status: &StatusSender) -> Option<PathBuf> {
        if !root.is_dir() {
            status.warning(format!(
                "Directory not found or is not a directory, skipping: {}",
                root.display()
            ));
            return None;
        }
        match root.canonicalize() {
            Ok(absolute) => Some(absolute),
            Err(e) => {
                status.warning(format!("Cannot resolve directory {}: {}", root.display(), e));
                None
            }
        }
    }
}
