// src/pool/entity.rs

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PipelineEnv;
use super::pipeline::{self, Pipeline, ProcessSlot, Step, WorkingCopy};
use super::status::StatusCell;
use crate::build::{BuildConfig, BuildConfigPatch};
use crate::errors::{MuppetError, Result};
use crate::sink::LogSink;
use crate::types::TaskStatus;

/// Maximum number of queued pipeline steps per task.
pub const STEP_QUEUE_CAPACITY: usize = 10;

type FinishedFn = dyn Fn(&str, TaskStatus) + Send + Sync;
type RemoteFn = dyn Fn(BuildConfigPatch) + Send + Sync;

/// Callbacks from a task back to its owner.
#[derive(Clone)]
pub struct TaskHooks {
    /// Task log destination.
    pub log: Arc<dyn LogSink>,
    /// Called once when the pipeline lane ends, with the settled status.
    pub finished: Arc<FinishedFn>,
    /// Called when the pipeline learns the repository URL of a config that
    /// did not record one.
    pub remote_discovered: Arc<RemoteFn>,
}

impl TaskHooks {
    /// Hooks that only log.
    pub fn logging(log: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            finished: Arc::new(|_: &str, _: TaskStatus| {}),
            remote_discovered: Arc::new(|_: BuildConfigPatch| {}),
        }
    }
}

impl fmt::Debug for TaskHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHooks").field("log", &self.log).finish_non_exhaustive()
    }
}

/// One build task in the pool.
///
/// Owns the task's status, its pipeline lane and whatever subprocess that
/// lane is currently running. Created `Waiting`; [`start`](Self::start)
/// queues the steps and spawns the lane, [`stop`](Self::stop) cancels it and
/// kills the live subprocess, [`close`](Self::close) releases everything.
pub struct TaskEntity {
    config: BuildConfig,
    seq: u64,
    env: Arc<PipelineEnv>,
    hooks: TaskHooks,
    status: StatusCell,
    cancel: CancellationToken,
    process: ProcessSlot,
    queue: Mutex<Option<mpsc::Sender<Step>>>,
    lane: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskEntity {
    pub fn new(config: BuildConfig, seq: u64, env: Arc<PipelineEnv>, hooks: TaskHooks) -> Result<Self> {
        if !config.is_valid() {
            return Err(MuppetError::InvalidBuildConfig(format!(
                "name, category and profile must be set (got name='{}')",
                config.name()
            )));
        }

        Ok(Self {
            config,
            seq,
            env,
            hooks,
            status: StatusCell::new(),
            cancel: CancellationToken::new(),
            process: ProcessSlot::default(),
            queue: Mutex::new(None),
            lane: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Creation order within the pool.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn status(&self) -> TaskStatus {
        self.status.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    /// Resolved source directory; the key for conflict checks.
    pub fn source(&self) -> String {
        self.config.source(&self.env.layout)
    }

    /// Pid of the subprocess the pipeline is running right now.
    pub fn live_pid(&self) -> Option<u32> {
        self.process.pid()
    }

    fn log(&self, message: &str) {
        self.hooks.log.log(self.name(), message);
    }

    /// Move to `Working`, queue the step plan and spawn the pipeline lane.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        if !self.status.begin() {
            return Err(MuppetError::AlreadyStarted(format!(
                "{} is {}",
                self.name(),
                self.status.get()
            )));
        }

        let working_copy =
            WorkingCopy::detect(std::path::Path::new(&self.source()), &self.env.settings.vcs.metadata_dir);
        let steps = pipeline::plan(&self.config, working_copy);
        debug!(task = %self.name(), ?working_copy, ?steps, "starting pipeline");

        let (tx, rx) = mpsc::channel(STEP_QUEUE_CAPACITY);
        for step in steps {
            if tx.try_send(step).is_err() {
                warn!(task = %self.name(), %step, "step queue full; step dropped");
            }
        }

        let lane = tokio::spawn(pipeline::drive(
            Pipeline {
                name: self.name().to_string(),
                config: self.config.clone(),
                env: Arc::clone(&self.env),
                hooks: self.hooks.clone(),
                status: self.status.clone(),
                process: self.process.clone(),
                cancel: self.cancel.clone(),
            },
            rx,
        ));

        *lock(&self.queue) = Some(tx);
        *lock(&self.lane) = Some(lane);
        info!(task = %self.name(), "task started");
        Ok(())
    }

    /// Cancel the task. Non-blocking: the live subprocess tree is killed and
    /// queued steps are dropped; the task ends `Finished`.
    ///
    /// No effect on a terminal task.
    pub fn stop(&self) {
        if !self.status.request_stop() {
            debug!(task = %self.name(), status = %self.status.get(), "stop ignored");
            return;
        }

        self.log("Task stopping");
        self.cancel.cancel();
        lock(&self.queue).take();
        self.process.terminate();
        self.status.stopped();
        info!(task = %self.name(), "task stopped");
    }

    /// Mark a task that could not be started as failed.
    pub fn mark_failed(&self, reason: &str) {
        if self.status.abort() {
            self.log(reason);
        }
    }

    /// Release the pipeline lane and any live subprocess. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.status.get().is_terminal() {
            self.stop();
        }

        self.cancel.cancel();
        lock(&self.queue).take();
        self.process.terminate();
        if let Some(lane) = lock(&self.lane).take() {
            lane.abort();
        }
        debug!(task = %self.name(), "task closed");
    }
}

impl Drop for TaskEntity {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TaskEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEntity")
            .field("name", &self.name())
            .field("seq", &self.seq)
            .field("status", &self.status.get())
            .finish()
    }
}
