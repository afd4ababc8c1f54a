//! One-way status stream from a run to its observer.
//!
//! Sends never block and never fail the sender: a run must not stall or abort because
//! nobody is listening.

use super::types::StatusEvent;
use tracing::warn;

/// Create a connected sender/receiver pair backed by an unbounded channel.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = flume::unbounded();
    (StatusSender { tx }, StatusReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: flume::Sender<StatusEvent>,
}

impl StatusSender {
    /// Best-effort send. A disconnected receiver is logged and otherwise ignored.
    pub fn send(&self, event: StatusEvent) {
        if let Err(flume::SendError(event)) = self.tx.send(event) {
            warn!("Status receiver gone, dropping event: {}", event);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(StatusEvent::info(message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.send(StatusEvent::warning(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(StatusEvent::error(message));
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.send(StatusEvent::fatal(message));
    }

    pub fn completed(&self) {
        self.send(StatusEvent::Completed);
    }

    pub fn aborted(&self, reason: impl Into<String>) {
        self.send(StatusEvent::aborted(reason));
    }
}

#[derive(Debug, Clone)]
pub struct StatusReceiver {
    rx: flume::Receiver<StatusEvent>,
}

impl StatusReceiver {
    /// Wait for the next event. `None` once every sender is dropped and the queue is empty.
    pub async fn recv(&self) -> Option<StatusEvent> {
        self.rx.recv_async().await.ok()
    }

    /// Everything queued right now, without waiting
    pub fn drain(&self) -> Vec<StatusEvent> {
        self.rx.try_iter().collect()
    }
}
