//! Indexing orchestrator: scan, detect changes, process in parallel, persist.
//!
//! ## Pipeline Flow
//!
//! ```text
//! DirectoryScanner → ChangeDetector → TaskQueue ──┬─ worker ─┐
//!                                                 ├─ worker ─┼→ results → FaceStore
//!                                                 └─ worker ─┘
//! ```
//!
//! Workers only talk to the [`FaceEmbeddingProvider`]; the engine alone writes to the
//! store, one transaction per file, in the order results arrive.
//!
//! ## Failure Handling
//!
//! - A file that cannot be processed is counted and cleared from the store so it is
//!   retried next run
//! - A failed commit is counted and leaves that file as it was
//! - A provider that cannot be started aborts the run; the file it was given keeps its rows
//! - An unreachable store, an unreadable snapshot, or a worker pool that stops early
//!   aborts the run
//!
//! Every run ends with exactly one [`StatusEvent::Completed`] or [`StatusEvent::Aborted`].

use crate::config::IndexingConfig;
use crate::status::{IndexingSummary, StatusEvent, StatusSender};
use crate::storage::sqlite_store::SqliteFaceStore;
use crate::storage::{FaceStore, ProcessedFile};
use anyhow::{Result, anyhow};
use face_finder_embed::{DetectionModel, FaceEmbeddingProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::change_detector::{ChangeDetector, file_modification_time};
use super::scanner::DirectoryScanner;
use super::task_queue::{FileOutcome, IndexingTask, TaskQueue, TaskResult, display_name};

/// Runs one indexing pass over the configured roots.
pub struct IndexingEngine {
    config: IndexingConfig,
    provider: Arc<dyn FaceEmbeddingProvider>,
    status: StatusSender,
}

impl IndexingEngine {
    pub fn new(
        config: IndexingConfig,
        provider: Arc<dyn FaceEmbeddingProvider>,
        status: StatusSender,
    ) -> Self {
        Self {
            config,
            provider,
            status,
        }
    }

    /// Open the configured SQLite store and index into it.
    pub async fn run(&self) -> Result<IndexingSummary> {
        if let Err(e) = self.config.validate() {
            self.status.error(e.to_string());
            self.status.aborted(e.to_string());
            return Err(e.into());
        }

        let store = match SqliteFaceStore::open(&self.config.store_path).await {
            Ok(store) => store,
            Err(e) => {
                let message = format!(
                    "Failed to connect to database {}: {:#}",
                    self.config.store_path.display(),
                    e
                );
                self.abort(&message);
                return Err(e);
            }
        };

        let result = self.run_with_store(Arc::new(store.clone())).await;
        store.close().await;
        result
    }

    /// Index into an already opened store.
    pub async fn run_with_store(&self, store: Arc<dyn FaceStore>) -> Result<IndexingSummary> {
        let start = Instant::now();
        if let Err(e) = self.config.validate() {
            self.status.error(e.to_string());
            self.status.aborted(e.to_string());
            return Err(e.into());
        }

        self.announce();

        let snapshot = match store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.abort(&format!("Failed to read indexed files: {e:#}"));
                return Err(e);
            }
        };
        self.status.info(format!(
            "Found {} files previously indexed.",
            snapshot.len()
        ));

        let extensions = self
            .config
            .supported_extensions(self.provider.supports_extended_formats());
        let scanner = DirectoryScanner::new(self.config.roots.clone(), extensions);
        let candidates: Vec<_> = scanner.scan(&self.status).collect();

        let mut summary = IndexingSummary {
            files_found: candidates.len(),
            ..IndexingSummary::default()
        };
        self.status.info(format!(
            "Found {} potential image files.",
            summary.files_found
        ));

        if self.config.force_rescan {
            self.status
                .info("Force rescanning enabled, processing all found images.");
        } else {
            self.status
                .info("Checking which files are new or modified...");
            let detector = ChangeDetector::new(&snapshot, false);
            let mut estimated = 0;
            for path in &candidates {
                if let Ok(mtime) = file_modification_time(path).await {
                    if detector.is_stale(path, mtime) {
                        estimated += 1;
                    }
                }
            }
            self.status
                .info(format!("Estimated {estimated} files need processing."));
        }

        let plan = ChangeDetector::new(&snapshot, self.config.force_rescan)
            .plan(candidates, &self.status)
            .await;
        summary.files_to_process = plan.to_process.len();
        summary.files_skipped = plan.skipped;
        summary.check_errors = plan.check_errors;

        self.status.info(format!(
            "Identified {} new or modified files to process.",
            summary.files_to_process
        ));
        self.status.info(format!(
            "Skipped {} already indexed and unchanged files.",
            summary.files_skipped
        ));
        if summary.check_errors > 0 {
            self.status.warning(format!(
                "Encountered {} errors during file status checks.",
                summary.check_errors
            ));
        }

        if plan.to_process.is_empty() {
            self.status.info("No new or modified files to process.");
            return Ok(self.finish(summary, start));
        }

        self.status.info(format!(
            "Starting face detection and encoding with {} workers...",
            self.config.max_workers
        ));

        if let Err(e) = self
            .process_all(store.as_ref(), plan.to_process, &mut summary)
            .await
        {
            self.abort(&format!("Indexing aborted: {e:#}"));
            return Err(e);
        }

        self.status.info("Processing complete.");
        Ok(self.finish(summary, start))
    }

    fn announce(&self) {
        let roots: Vec<String> = self
            .config
            .roots
            .iter()
            .map(|r| r.display().to_string())
            .collect();

        info!(
            "Indexing {} root(s) into {} with {} workers",
            roots.len(),
            self.config.store_path.display(),
            self.config.max_workers
        );
        self.status.info(format!(
            "Using database: {}",
            self.config.store_path.display()
        ));
        self.status
            .info(format!("Scanning directories: {}", roots.join(", ")));
        self.status.info(format!(
            "Using {} worker processes.",
            self.config.max_workers
        ));
        self.status.info(format!(
            "Using face detection model: {}",
            self.config.detection_model
        ));
        if self.config.force_rescan {
            self.status.info("Forcing rescan of all found images.");
        }
    }

    /// Fan `paths` out to the worker pool and apply results as they complete.
    async fn process_all(
        &self,
        store: &dyn FaceStore,
        paths: Vec<std::path::PathBuf>,
        summary: &mut IndexingSummary,
    ) -> Result<()> {
        let mut queue = TaskQueue::new();
        queue
            .submit_tasks(paths.into_iter().map(IndexingTask::index_file))
            .map_err(anyhow::Error::msg)?;
        queue.close();
        let total = queue.submitted();

        let (result_tx, result_rx) = flume::unbounded::<TaskResult>();
        let worker_count = self.config.max_workers.clamp(1, total);
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            workers.push(tokio::spawn(run_worker(
                id,
                queue.worker_receiver(),
                result_tx.clone(),
                Arc::clone(&self.provider),
                self.config.detection_model,
            )));
        }
        drop(result_tx);
        debug!("Started {} indexing workers for {} files", worker_count, total);

        let mut completed = 0;
        let mut halted = None;
        while completed < total {
            let Ok(result) = result_rx.recv_async().await else {
                break;
            };
            let item = display_name(&result.path);
            if let Err(e) = self.apply_result(store, result, summary).await {
                halted = Some(e);
                break;
            }
            completed += 1;
            self.status
                .send(StatusEvent::progress(completed, total, item));
        }

        if halted.is_some() {
            let discarded = queue.discard_pending();
            debug!("Discarded {} queued files", discarded);
        }
        // Workers stop at their next send once nobody is reading results
        drop(result_rx);

        for handle in workers {
            if let Err(e) = handle.await {
                error!("Indexing worker failed: {}", e);
            }
        }

        if let Some(e) = halted {
            return Err(e);
        }
        if completed < total {
            return Err(anyhow!(
                "worker pool stopped after {completed} of {total} files"
            ));
        }
        Ok(())
    }

    /// Commit one worker result. Per-file failures are counted; only a provider that
    /// cannot run at all is returned as an error, with nothing written for the file.
    async fn apply_result(
        &self,
        store: &dyn FaceStore,
        result: TaskResult,
        summary: &mut IndexingSummary,
    ) -> Result<()> {
        let TaskResult { path, outcome } = result;
        match outcome {
            FileOutcome::Faces {
                last_modified,
                faces,
            } => {
                let processed = ProcessedFile {
                    last_modified,
                    faces,
                };
                match store.replace_file_faces(&path, Some(&processed)).await {
                    Ok(inserted) => {
                        summary.files_processed += 1;
                        summary.faces_stored += inserted;
                        if inserted > 0 {
                            summary.files_with_faces += 1;
                        }
                    }
                    Err(e) => {
                        summary.database_errors += 1;
                        warn!("Commit failed for {}: {:#}", path.display(), e);
                        self.status.error(format!(
                            "Database error updating for {}: {:#}",
                            path.display(),
                            e
                        ));
                    }
                }
            }
            FileOutcome::Failed { reason } => {
                summary.processing_errors += 1;
                self.status.error(format!(
                    "Failed to process {}: {}",
                    path.display(),
                    reason
                ));
                if let Err(e) = store.replace_file_faces(&path, None).await {
                    summary.database_errors += 1;
                    self.status.error(format!(
                        "Database error updating for {}: {:#}",
                        path.display(),
                        e
                    ));
                }
            }
            FileOutcome::Unavailable { reason } => {
                return Err(anyhow!(
                    "face provider unavailable while processing {}: {}",
                    path.display(),
                    reason
                ));
            }
        }
        Ok(())
    }

    fn finish(&self, mut summary: IndexingSummary, start: Instant) -> IndexingSummary {
        summary.elapsed_secs = start.elapsed().as_secs_f64();
        for line in summary.report_lines() {
            self.status.info(line);
        }
        info!(
            "Indexing finished: {} processed, {} faces stored, {} errors in {:.2}s",
            summary.files_processed,
            summary.faces_stored,
            summary.error_count(),
            summary.elapsed_secs
        );
        self.status.completed();
        summary
    }

    fn abort(&self, message: &str) {
        error!("{}", message);
        self.status.fatal(message);
        self.status.aborted(message);
    }
}

/// Pull tasks until the queue is drained, pushing one result per task.
async fn run_worker(
    id: usize,
    tasks: flume::Receiver<IndexingTask>,
    results: flume::Sender<TaskResult>,
    provider: Arc<dyn FaceEmbeddingProvider>,
    model: DetectionModel,
) {
    debug!("Worker {} started", id);
    while let Ok(task) = tasks.recv_async().await {
        let outcome = process_file(provider.as_ref(), &task.path, model).await;
        let result = TaskResult {
            path: task.path,
            outcome,
        };
        if results.send_async(result).await.is_err() {
            warn!("Result channel closed, worker {} stopping", id);
            break;
        }
    }
    debug!("Worker {} finished", id);
}

/// Stat, detect and embed one file. Never fails; errors become [`FileOutcome::Failed`].
pub async fn process_file(
    provider: &dyn FaceEmbeddingProvider,
    path: &Path,
    model: DetectionModel,
) -> FileOutcome {
    let last_modified = match file_modification_time(path).await {
        Ok(mtime) => mtime,
        Err(e) => {
            return FileOutcome::Failed {
                reason: format!("cannot read file metadata: {e}"),
            };
        }
    };

    match provider.detect_and_embed(path, model).await {
        Ok(faces) => {
            debug!("Found {} face(s) in {}", faces.len(), path.display());
            FileOutcome::Faces {
                last_modified,
                faces,
            }
        }
        Err(e) if e.is_environment_error() => {
            error!("Provider {} cannot run: {}", provider.provider_name(), e);
            FileOutcome::Unavailable {
                reason: e.to_string(),
            }
        }
        Err(e) => {
            if e.is_input_error() {
                debug!("Skipping unreadable image {}: {}", path.display(), e);
            } else {
                warn!("Provider {} failed on {}: {}", provider.provider_name(), path.display(), e);
            }
            FileOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}
