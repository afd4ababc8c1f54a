//! Work queue shared by the indexing workers
//!
//! The orchestrator submits every path up front and closes the queue. Workers pull from
//! the same multi-consumer channel until it is drained and closed, so each task is
//! handed to exactly one worker.

use face_finder_embed::FaceDetection;
use std::path::PathBuf;
use tracing::debug;

/// One file to run through face detection.
#[derive(Debug, Clone)]
pub struct IndexingTask {
    pub path: PathBuf,
}

impl IndexingTask {
    pub fn index_file(path: PathBuf) -> Self {
        Self { path }
    }
}

/// What a worker learned about one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Detection succeeded. `faces` is empty for a photo without faces.
    Faces {
        last_modified: f64,
        faces: Vec<FaceDetection>,
    },
    /// The file could not be processed
    Failed { reason: String },
    /// The provider itself cannot run, so no file can be processed
    Unavailable { reason: String },
}

/// A worker's answer for one task, sent back to the orchestrator.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// File name of `path`, falling back to the whole path
pub fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Unbounded multi-producer multi-consumer queue of [`IndexingTask`]s.
#[derive(Debug)]
pub struct TaskQueue {
    sender: Option<flume::Sender<IndexingTask>>,
    receiver: flume::Receiver<IndexingTask>,
    submitted: usize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender: Some(sender),
            receiver,
            submitted: 0,
        }
    }

    /// Submit a task to the queue
    pub fn submit_task(&mut self, task: IndexingTask) -> Result<(), String> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| "Task queue is closed".to_string())?;
        debug!("Submitting task: {}", task.path.display());
        sender
            .send(task)
            .map_err(|e| format!("Failed to submit task: {e}"))?;
        self.submitted += 1;
        Ok(())
    }

    /// Submit multiple tasks at once
    pub fn submit_tasks(
        &mut self,
        tasks: impl IntoIterator<Item = IndexingTask>,
    ) -> Result<(), String> {
        for task in tasks {
            self.submit_task(task)?;
        }
        Ok(())
    }

    /// Stop accepting tasks. Workers see the end of the queue once it is drained.
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// A consumer handle for one worker
    pub fn worker_receiver(&self) -> flume::Receiver<IndexingTask> {
        self.receiver.clone()
    }

    /// Total tasks submitted since creation
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Drop every task no worker has picked up yet, returning how many were dropped
    pub fn discard_pending(&self) -> usize {
        self.receiver.drain().count()
    }
}
