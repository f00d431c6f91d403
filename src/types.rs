// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Text returned by status queries for a task that is not in the pool.
pub const STATUS_NOT_FOUND: &str = "Null";

/// Lifecycle of a single build task.
///
/// `Waiting -> Working -> {Finished | Error | Stopping -> Finished}`
///
/// - `Waiting` is the initial state.
/// - `Finished` and `Error` are terminal.
/// - `Stopping` is transient while a cancellation is in progress and always
///   resolves to `Finished`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Waiting,
    Working,
    Stopping,
    Finished,
    Error,
}

impl TaskStatus {
    /// `true` for states the pool manager reconciles away.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Waiting => "Waiting",
            TaskStatus::Working => "Working",
            TaskStatus::Stopping => "Stopping",
            TaskStatus::Finished => "Finished",
            TaskStatus::Error => "Error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "waiting" => Ok(TaskStatus::Waiting),
            "working" => Ok(TaskStatus::Working),
            "stopping" => Ok(TaskStatus::Stopping),
            "finished" => Ok(TaskStatus::Finished),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}
