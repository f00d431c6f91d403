// src/events.rs

//! Events exchanged between actors.
//!
//! Every event belongs to exactly one [`EventKind`]; the router delivers an
//! event to each actor whose declared interest contains its kind. Payload and
//! reply types are fixed per variant, so a handler never needs a runtime
//! type check.

use std::collections::BTreeMap;
use std::fmt;

use crate::build::{BuildConfig, BuildConfigPatch};
use crate::dispatch::Envelope;
use crate::sink::LogLine;

/// Routing category of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Pool,
    Config,
    Server,
    /// Reserved: handled by the router itself, never delivered.
    Shutdown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Pool => "pool",
            EventKind::Config => "config",
            EventKind::Server => "server",
            EventKind::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Pool(PoolEvent),
    Config(ConfigEvent),
    Server(ServerEvent),
    /// Stop the process; the payload is the exit code when it parses as an
    /// integer, otherwise 0.
    Shutdown(Envelope<String, ()>),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Pool(_) => EventKind::Pool,
            Event::Config(_) => EventKind::Config,
            Event::Server(_) => EventKind::Server,
            Event::Shutdown(_) => EventKind::Shutdown,
        }
    }

    /// Shutdown event without a reply.
    pub fn shutdown(code: impl ToString) -> Self {
        Event::Shutdown(Envelope::data(code.to_string()))
    }
}

/// Requests served by the task pool manager.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// Replies `"Success"` or an admission error.
    CreateTask(Envelope<BuildConfig, String>),
    /// Replies `"Success"` or `"Can not find target task"`.
    StopTask(Envelope<String, String>),
    /// Replies the status text, or `"Null"` for unknown names.
    TaskStatus(Envelope<String, String>),
    /// Names of every task in the pool.
    ProcessingList(Envelope<(), Vec<String>>),
    WaitingList(Envelope<(), Vec<String>>),
    WorkingList(Envelope<(), Vec<String>>),
}

/// Requests served by the config center.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    Get(Envelope<String, Option<BuildConfig>>),
    /// Name to category for every stored config.
    List(Envelope<(), BTreeMap<String, String>>),
    Add(Envelope<BuildConfig, String>),
    Modify(Envelope<BuildConfigPatch, String>),
    Delete(Envelope<String, String>),
    Save(Envelope<(), String>),
    Reload(Envelope<(), String>),
}

/// Notifications for the client-facing side.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Broadcast(Envelope<LogLine, ()>),
    TaskFinish(Envelope<String, ()>),
}
