//! Decide which discovered files need (re)processing
//!
//! A file is processed when the store has never seen it or when its modification time
//! is strictly newer than the one recorded. Everything else is skipped. Files that
//! cannot be inspected are counted and left out, never fatal.

use crate::status::StatusSender;
use crate::storage::IndexedSnapshot;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Output of change detection. All three parts are reported to the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangePlan {
    pub to_process: Vec<PathBuf>,
    /// Files already current in the store
    pub skipped: usize,
    /// Files that vanished or could not be inspected
    pub check_errors: usize,
}

/// Modification time in seconds since the Unix epoch, negative for earlier times.
pub fn modification_time(metadata: &Metadata) -> io::Result<f64> {
    let modified = metadata.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    })
}

/// Stat `path` and return its modification time
pub async fn file_modification_time(path: &Path) -> io::Result<f64> {
    let metadata = tokio::fs::metadata(path).await?;
    modification_time(&metadata)
}

#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector<'a> {
    snapshot: &'a IndexedSnapshot,
    force_rescan: bool,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(snapshot: &'a IndexedSnapshot, force_rescan: bool) -> Self {
        Self {
            snapshot,
            force_rescan,
        }
    }

    /// Whether a file with the given current modification time must be processed
    pub fn is_stale(&self, path: &Path, current_mtime: f64) -> bool {
        match self.snapshot.get(path) {
            Some(&recorded) => current_mtime > recorded,
            None => true,
        }
    }

    /// Split `candidates` into files to process, skipped files and check errors.
    pub async fn plan(
        &self,
        candidates: impl IntoIterator<Item = PathBuf>,
        status: &StatusSender,
    ) -> ChangePlan {
        let mut plan = ChangePlan::default();

        if self.force_rescan {
            plan.to_process = candidates.into_iter().collect();
            return plan;
        }

        for path in candidates {
            match file_modification_time(&path).await {
                Ok(mtime) if self.is_stale(&path, mtime) => plan.to_process.push(path),
                Ok(_) => plan.skipped += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    status.warning(format!(
                        "File found during scan no longer exists: {}",
                        path.display()
                    ));
                    plan.check_errors += 1;
                }
                Err(e) => {
                    status.error(format!("checking file status {}: {}", path.display(), e));
                    plan.check_errors += 1;
                }
            }
        }

        debug!(
            "Change detection: {} to process, {} skipped, {} check errors",
            plan.to_process.len(),
            plan.skipped,
            plan.check_errors
        );
        plan
    }
}
