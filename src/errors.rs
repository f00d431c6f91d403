// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuppetError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid build config: {0}")]
    InvalidBuildConfig(String),

    #[error("Task '{0}' has already been started")]
    AlreadyStarted(String),

    /// An outbound queue had no room for a non-blocking publish.
    #[error("outbound queue of '{source_name}' is full; dropped {kind} event")]
    QueueFull { source_name: String, kind: String },

    /// The receiving side of a mailbox or outbound queue has been dropped.
    #[error("actor '{0}' is no longer running")]
    ActorGone(String),

    /// A request envelope was dropped without its reply being invoked.
    #[error("no reply received for request")]
    NoReply,

    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MuppetError>;
