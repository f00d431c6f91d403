use std::sync::Mutex;

use muppet::sink::{LogLine, LogSink};

/// Log sink that keeps every pushed line.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<LogLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().unwrap().clone()
    }

    /// Messages logged for `task`, in order.
    pub fn messages(&self, task: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.task == task)
            .map(|l| l.message)
            .collect()
    }

    /// `true` if any message for `task` contains `needle`.
    pub fn contains(&self, task: &str, needle: &str) -> bool {
        self.messages(task).iter().any(|m| m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn push(&self, line: LogLine) {
        self.lines.lock().unwrap().push(line);
    }
}
