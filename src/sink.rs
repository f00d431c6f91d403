// src/sink.rs

//! Task log lines and where they go.
//!
//! Build output and pipeline progress are pushed as [`LogLine`]s into a
//! [`LogSink`]. The production sink, [`BroadcastSink`], mirrors each line to
//! `tracing` and fans it out over a `tokio::sync::broadcast` channel that any
//! number of subscribers (a transport layer, tests) can read. Publishing is
//! write-only and safe from any task.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::dispatch::{Actor, ActorContext};
use crate::events::{Event, EventKind, ServerEvent};

/// Default number of buffered lines per subscriber.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// One line of task output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    #[serde(rename = "name")]
    pub task: String,
    pub time: DateTime<Local>,
    #[serde(rename = "msg")]
    pub message: String,
}

impl LogLine {
    pub fn now(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            time: Local::now(),
            message: message.into(),
        }
    }

    /// Timestamp in the `MM-dd HH:mm:ss` form used in rendered lines.
    pub fn stamp(&self) -> String {
        self.time.format("%m-%d %H:%M:%S").to_string()
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]: {}", self.task, self.stamp(), self.message)
    }
}

/// Destination for task log lines. Fire-and-forget.
pub trait LogSink: Send + Sync + fmt::Debug {
    fn push(&self, line: LogLine);

    fn log(&self, task: &str, message: &str) {
        self.push(LogLine::now(task, message));
    }
}

/// Sink that logs through `tracing` and broadcasts to subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LogLine>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogSink for BroadcastSink {
    fn push(&self, line: LogLine) {
        if line.message.trim().is_empty() {
            return;
        }
        info!(task = %line.task, "{}", line.message);
        // No subscribers is fine.
        let _ = self.tx.send(line);
    }
}

/// Actor serving [`ServerEvent`]s: broadcasts published log lines and
/// announces finished tasks on the same channel.
#[derive(Debug)]
pub struct Broadcaster {
    sink: Arc<dyn LogSink>,
}

impl Broadcaster {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl Actor for Broadcaster {
    fn name(&self) -> &'static str {
        "broadcaster"
    }

    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::Server]
    }

    async fn handle(&mut self, event: Event, _ctx: &ActorContext) {
        match event {
            Event::Server(ServerEvent::Broadcast(envelope)) => {
                let (line, reply) = envelope.into_parts();
                self.sink.push(line);
                reply.send(());
            }
            Event::Server(ServerEvent::TaskFinish(envelope)) => {
                let (name, reply) = envelope.into_parts();
                info!(task = %name, "task left the pool");
                reply.send(());
            }
            _ => {}
        }
    }
}
