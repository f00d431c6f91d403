// src/client.rs

//! Typed request API over the event router.
//!
//! Each call publishes one event and waits, bounded by the client timeout,
//! for the reply of whichever actor serves it.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::build::BuildConfig;
use crate::dispatch::Publisher;
use crate::errors::Result;
use crate::events::{ConfigEvent, Event, PoolEvent};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reply to `execute` when the build list has no such config.
pub const UNKNOWN_CONFIG: &str = "Can not find build config";

#[derive(Debug, Clone)]
pub struct Client {
    publisher: Publisher,
    timeout: Duration,
}

impl Client {
    pub fn new(publisher: Publisher) -> Self {
        Self {
            publisher,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn create_task(&self, config: BuildConfig) -> Result<String> {
        self.publisher
            .request(config, |env| Event::Pool(PoolEvent::CreateTask(env)), self.timeout)
            .await
    }

    pub async fn stop_task(&self, name: &str) -> Result<String> {
        self.publisher
            .request(name.to_string(), |env| Event::Pool(PoolEvent::StopTask(env)), self.timeout)
            .await
    }

    pub async fn task_status(&self, name: &str) -> Result<String> {
        self.publisher
            .request(name.to_string(), |env| Event::Pool(PoolEvent::TaskStatus(env)), self.timeout)
            .await
    }

    pub async fn processing_list(&self) -> Result<Vec<String>> {
        self.publisher
            .request((), |env| Event::Pool(PoolEvent::ProcessingList(env)), self.timeout)
            .await
    }

    pub async fn waiting_list(&self) -> Result<Vec<String>> {
        self.publisher
            .request((), |env| Event::Pool(PoolEvent::WaitingList(env)), self.timeout)
            .await
    }

    pub async fn working_list(&self) -> Result<Vec<String>> {
        self.publisher
            .request((), |env| Event::Pool(PoolEvent::WorkingList(env)), self.timeout)
            .await
    }

    pub async fn get_config(&self, name: &str) -> Result<Option<BuildConfig>> {
        self.publisher
            .request(name.to_string(), |env| Event::Config(ConfigEvent::Get(env)), self.timeout)
            .await
    }

    pub async fn list_configs(&self) -> Result<BTreeMap<String, String>> {
        self.publisher
            .request((), |env| Event::Config(ConfigEvent::List(env)), self.timeout)
            .await
    }

    pub async fn save_configs(&self) -> Result<String> {
        self.publisher
            .request((), |env| Event::Config(ConfigEvent::Save(env)), self.timeout)
            .await
    }

    pub async fn reload_configs(&self) -> Result<String> {
        self.publisher
            .request((), |env| Event::Config(ConfigEvent::Reload(env)), self.timeout)
            .await
    }

    /// Look the named config up in the build list and queue a build of it.
    pub async fn execute(&self, name: &str) -> Result<String> {
        match self.get_config(name).await? {
            Some(config) => {
                debug!(task = %name, "queueing build from stored config");
                self.create_task(config).await
            }
            None => Ok(UNKNOWN_CONFIG.to_string()),
        }
    }

    pub async fn shutdown(&self, code: i32) -> Result<()> {
        self.publisher.shutdown(code).await
    }
}
