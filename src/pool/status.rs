// src/pool/status.rs

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::TaskStatus;

/// Shared, observable task status.
///
/// Written from the entity's pipeline lane and from the pool manager, read
/// from anywhere. Every write goes through a guarded transition so a late
/// writer cannot move a task out of a state it has already left (for
/// example a step failing after the task was stopped).
#[derive(Debug, Clone)]
pub struct StatusCell {
    tx: Arc<watch::Sender<TaskStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TaskStatus::Waiting);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> TaskStatus {
        *self.tx.borrow()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.tx.subscribe()
    }

    fn transition(&self, from: &[TaskStatus], to: TaskStatus) -> bool {
        self.tx.send_if_modified(|status| {
            if from.contains(status) {
                *status = to;
                true
            } else {
                false
            }
        })
    }

    /// `Waiting -> Working`.
    pub fn begin(&self) -> bool {
        self.transition(&[TaskStatus::Waiting], TaskStatus::Working)
    }

    /// `Working -> Finished`.
    pub fn complete(&self) -> bool {
        self.transition(&[TaskStatus::Working], TaskStatus::Finished)
    }

    /// `Working -> Error`.
    pub fn fail(&self) -> bool {
        self.transition(&[TaskStatus::Working], TaskStatus::Error)
    }

    /// `Waiting | Working -> Error`, for tasks that could not be started.
    pub fn abort(&self) -> bool {
        self.transition(&[TaskStatus::Waiting, TaskStatus::Working], TaskStatus::Error)
    }

    /// `Waiting | Working -> Stopping`.
    pub fn request_stop(&self) -> bool {
        self.transition(&[TaskStatus::Waiting, TaskStatus::Working], TaskStatus::Stopping)
    }

    /// `Stopping -> Finished`.
    pub fn stopped(&self) -> bool {
        self.transition(&[TaskStatus::Stopping], TaskStatus::Finished)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
