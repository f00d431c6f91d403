// src/pool/pipeline.rs

//! Build pipeline steps.
//!
//! A started task runs its steps strictly in order on one Tokio task (the
//! pipeline lane). Each subprocess's stderr is drained on a second task while
//! the lane reads stdout, so a chatty compiler cannot fill its stderr pipe
//! and stall the build.
//!
//! Steps:
//! 1. `ResolveRemote`: only when the config has no repository URL; reads it
//!    from the existing working copy.
//! 2. `Update` or `Checkout`: picked when the plan is built, depending on
//!    whether the source directory is already a working copy. Skipped when
//!    the config sets `update = false`.
//! 3. `Clean`, 4. `Compile`, 5. `Upload`.
//!
//! Any step error ends the pipeline and marks the task `Error`; the error's
//! text is pushed to the task log.

use std::fmt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PipelineEnv;
use super::entity::TaskHooks;
use super::status::StatusCell;
use crate::build::{BuildConfig, BuildConfigPatch, params};
use crate::errors::MuppetError;
use crate::exec::remote::{RemoteShell, missing_candidates, split_destination};
use crate::exec::vcs::{self, SvnClient};
use crate::exec::{CommandLine, ProcessHandle, Terminator};
use crate::types::TaskStatus;

/// Text that marks a transfer failure as transient.
pub const LOST_CONNECTION: &str = "lost connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ResolveRemote,
    Update,
    Checkout,
    Clean,
    Compile,
    Upload,
    /// End of the queue.
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::ResolveRemote => "resolve-remote",
            Step::Update => "update",
            Step::Checkout => "checkout",
            Step::Clean => "clean",
            Step::Compile => "compile",
            Step::Upload => "upload",
            Step::Done => "done",
        };
        f.write_str(s)
    }
}

/// Whether the source directory already holds a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingCopy {
    Existing,
    Missing,
}

impl WorkingCopy {
    pub fn detect(source: &Path, metadata_dir: &str) -> Self {
        if source.join(metadata_dir).is_dir() {
            WorkingCopy::Existing
        } else {
            WorkingCopy::Missing
        }
    }
}

/// Ordered steps for `config`, ending with [`Step::Done`].
pub fn plan(config: &BuildConfig, working_copy: WorkingCopy) -> Vec<Step> {
    let mut steps = Vec::with_capacity(7);
    if config.remote().is_none() {
        steps.push(Step::ResolveRemote);
    }
    if config.should_sync() {
        steps.push(match working_copy {
            WorkingCopy::Existing => Step::Update,
            WorkingCopy::Missing => Step::Checkout,
        });
    }
    steps.extend([Step::Clean, Step::Compile, Step::Upload, Step::Done]);
    steps
}

/// Why a pipeline step failed. The `Display` text goes to the task log.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Can not read svn info in path {0}")]
    NoRemoteInfo(String),

    #[error("Error in svn operation: {0}")]
    Vcs(String),

    #[error("Invalid svn url")]
    MissingRemote,

    #[error("Can not create dir at {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Compile failed with exit code {0}")]
    Compile(i32),

    #[error("Invalid directory path {0}")]
    InvalidImageDir(String),

    #[error("Can not find image")]
    MissingArtifact,

    #[error("Image size is not right : {kib}KiB")]
    ArtifactTooSmall { kib: u64, bytes: u64 },

    #[error("Invalid upload destination {0}")]
    InvalidDestination(String),

    #[error("Can not create upload path {0}")]
    RemoteMkdir(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Failed to run command: {0}")]
    Spawn(#[from] MuppetError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The task was stopped while the step was running.
    #[error("Task stopped")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Skip the remaining steps; the task ends `Finished`.
    Finish,
}

/// Whether a command's output goes to the task log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Echo,
    Quiet,
}

/// How long to wait for the exit code once output has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitWait {
    /// Bounded by the configured exit timeout.
    Bounded,
    /// Until the process exits or is terminated.
    Natural,
}

#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<String>,
    stderr: Vec<String>,
    code: i32,
}

impl Captured {
    fn lines(&self) -> impl Iterator<Item = &String> {
        self.stdout.iter().chain(self.stderr.iter())
    }

    /// Most useful line to quote in an error message.
    fn summary(&self) -> String {
        self.stderr
            .iter()
            .rev()
            .chain(self.stdout.iter().rev())
            .find(|l| !l.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("exit code {}", self.code))
    }
}

/// The subprocess currently owned by a task, if any.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessSlot(Arc<Mutex<Option<Terminator>>>);

impl ProcessSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Terminator>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, terminator: Terminator) {
        *self.lock() = Some(terminator);
    }

    fn clear(&self) {
        self.lock().take();
    }

    /// Kill the live subprocess tree, if there is one.
    pub(crate) fn terminate(&self) {
        if let Some(terminator) = self.lock().take() {
            debug!(pid = ?terminator.pid(), "terminating live subprocess");
            terminator.terminate();
        }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.lock().as_ref().and_then(Terminator::pid)
    }
}

/// State owned by the pipeline lane of one task.
pub(crate) struct Pipeline {
    pub(crate) name: String,
    pub(crate) config: BuildConfig,
    pub(crate) env: Arc<PipelineEnv>,
    pub(crate) hooks: TaskHooks,
    pub(crate) status: StatusCell,
    pub(crate) process: ProcessSlot,
    pub(crate) cancel: CancellationToken,
}

/// Body of the pipeline lane: run queued steps, settle the final status and
/// fire the completion hook.
pub(crate) async fn drive(mut pipeline: Pipeline, mut steps: mpsc::Receiver<Step>) {
    let name = pipeline.name.clone();
    let status = pipeline.status.clone();
    let hooks = pipeline.hooks.clone();

    let outcome = AssertUnwindSafe(pipeline.run_queue(&mut steps))
        .catch_unwind()
        .await;

    if let Err(panic) = outcome {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(task = %name, panic = %msg, "pipeline step panicked");
        hooks.log.log(&name, &format!("Internal error: {msg}"));
        status.fail();
    }

    status.complete();
    let final_status = status.get();
    info!(task = %name, status = %final_status, "pipeline ended");
    (hooks.finished)(&name, final_status);
}

impl Pipeline {
    fn log(&self, message: &str) {
        self.hooks.log.log(&self.name, message);
    }

    fn source(&self) -> String {
        self.config.source(&self.env.layout)
    }

    fn local(&self) -> String {
        self.config.local(&self.env.layout)
    }

    fn svn(&self) -> SvnClient<'_> {
        SvnClient::new(self.env.runner.as_ref(), &self.env.settings.vcs.program)
    }

    async fn run_queue(&mut self, steps: &mut mpsc::Receiver<Step>) {
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => break,
                step = steps.recv() => match step {
                    Some(step) => step,
                    None => break,
                },
            };

            if step == Step::Done || self.status.get() != TaskStatus::Working {
                break;
            }

            debug!(task = %self.name, %step, "running step");
            match self.run(step).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Finish) => break,
                Err(PipelineError::Cancelled) => {
                    debug!(task = %self.name, %step, "step interrupted by stop");
                    break;
                }
                Err(e) => {
                    warn!(task = %self.name, %step, error = %e, "step failed");
                    self.log(&e.to_string());
                    self.status.fail();
                    break;
                }
            }
        }
    }

    async fn run(&mut self, step: Step) -> Result<StepOutcome, PipelineError> {
        match step {
            Step::ResolveRemote => self.resolve_remote().await,
            Step::Update => self.update().await,
            Step::Checkout => self.checkout().await,
            Step::Clean => self.clean().await,
            Step::Compile => self.compile().await,
            Step::Upload => self.upload().await,
            Step::Done => Ok(StepOutcome::Finish),
        }
    }

    /// Run one subprocess to completion, collecting its output.
    async fn execute(
        &self,
        mut handle: ProcessHandle,
        output: Output,
        exit: ExitWait,
    ) -> Result<Captured, PipelineError> {
        self.process.set(handle.terminator());
        let result = self.drain(&mut handle, output, exit).await;
        self.process.clear();
        result
    }

    async fn drain(
        &self,
        handle: &mut ProcessHandle,
        output: Output,
        exit: ExitWait,
    ) -> Result<Captured, PipelineError> {
        // Both readers outlive the exit wait: closing a pipe early would
        // kill a chatty child with SIGPIPE.
        let stderr_lane = handle.take_stderr().map(|mut lines| {
            let log = Arc::clone(&self.hooks.log);
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut collected = Vec::new();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if output == Output::Echo {
                                log.log(&name, &line);
                            }
                            collected.push(line);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(task = %name, error = %e, "failed to read process stderr");
                            break;
                        }
                    }
                }
                (collected, lines)
            })
        });

        let mut stdout = Vec::new();
        let mut stdout_lines = handle.take_stdout();
        if let Some(lines) = stdout_lines.as_mut() {
            loop {
                let next = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        handle.kill().await;
                        if let Some(lane) = &stderr_lane {
                            lane.abort();
                        }
                        return Err(PipelineError::Cancelled);
                    }
                    next = lines.next_line() => next,
                };

                match next {
                    Ok(Some(line)) => {
                        if line.contains(vcs::AUTH_PROMPT) {
                            self.answer_prompt(handle).await;
                        }
                        if output == Output::Echo {
                            self.log(&line);
                        }
                        stdout.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(task = %self.name, error = %e, "failed to read process output");
                        break;
                    }
                }
            }
        }

        let (stderr, _stderr_lines) = match stderr_lane {
            Some(mut lane) => tokio::select! {
                _ = self.cancel.cancelled() => {
                    lane.abort();
                    handle.kill().await;
                    return Err(PipelineError::Cancelled);
                }
                joined = &mut lane => match joined {
                    Ok((collected, lines)) => (collected, Some(lines)),
                    Err(e) => {
                        warn!(task = %self.name, error = %e, "stderr reader failed");
                        (Vec::new(), None)
                    }
                },
            },
            None => (Vec::new(), None),
        };

        let code = match exit {
            ExitWait::Bounded => handle.wait_exit_code(self.env.settings.vcs.exit_timeout).await,
            ExitWait::Natural => handle.wait().await,
        };
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        debug!(task = %self.name, cmd = %handle.command_line(), exit_code = code, "process finished");
        Ok(Captured {
            stdout,
            stderr,
            code,
        })
    }

    async fn answer_prompt(&self, handle: &mut ProcessHandle) {
        match &self.env.settings.vcs.password {
            Some(password) => {
                if let Err(e) = handle.write_line(password).await {
                    warn!(task = %self.name, error = %e, "failed to answer authentication prompt");
                }
            }
            None => warn!(task = %self.name, "authentication requested but no vcs password is configured"),
        }
    }

    fn check_vcs(&self, operation: &str, out: &Captured) -> Result<(), PipelineError> {
        if vcs::has_error(&out.stderr) || out.code != 0 {
            return Err(PipelineError::Vcs(format!("{operation}: {}", out.summary())));
        }
        Ok(())
    }

    async fn resolve_remote(&mut self) -> Result<StepOutcome, PipelineError> {
        let source = self.source();
        let handle = self.svn().info(&source)?;
        let out = self.execute(handle, Output::Quiet, ExitWait::Bounded).await?;

        let url = vcs::parse_url(&out.stdout).ok_or_else(|| PipelineError::NoRemoteInfo(source))?;
        self.log(&format!("Found svn url {url}"));
        self.config = self.config.with_param(params::SVN, url.clone());
        (self.hooks.remote_discovered)(BuildConfigPatch::named(&self.name).with_param(params::SVN, url));
        Ok(StepOutcome::Continue)
    }

    async fn update(&mut self) -> Result<StepOutcome, PipelineError> {
        let source = self.source();

        let handle = self.svn().cleanup(&source)?;
        let out = self.execute(handle, Output::Echo, ExitWait::Bounded).await?;
        self.check_vcs("cleanup", &out)?;

        if self.config.build_only_if_updated() {
            let remote = self.config.remote().ok_or(PipelineError::MissingRemote)?;

            let handle = self.svn().info(&remote)?;
            let remote_info = self.execute(handle, Output::Quiet, ExitWait::Bounded).await?;
            let remote_rev = vcs::parse_revision(&remote_info.stdout).ok_or_else(|| {
                PipelineError::Vcs(format!("can not read revision of {remote}: {}", remote_info.summary()))
            })?;

            let handle = self.svn().info(&source)?;
            let local_info = self.execute(handle, Output::Quiet, ExitWait::Bounded).await?;
            let local_rev = vcs::parse_revision(&local_info.stdout);

            let local_rev = local_rev.unwrap_or_else(|| "unknown".to_string());
            if local_rev == remote_rev {
                self.log(&format!(
                    "No update with remote rev={remote_rev} local rev={local_rev}, task finished"
                ));
                return Ok(StepOutcome::Finish);
            }
            self.log(&format!("Remote rev={remote_rev} local rev={local_rev}, updating"));
        }

        let revision = self.config.revision();
        let handle = self.svn().update(&source, revision.as_deref())?;
        let out = self.execute(handle, Output::Echo, ExitWait::Bounded).await?;
        self.check_vcs("update", &out)?;
        Ok(StepOutcome::Continue)
    }

    async fn checkout(&mut self) -> Result<StepOutcome, PipelineError> {
        let source = self.source();
        let remote = self.config.remote().ok_or(PipelineError::MissingRemote)?;

        tokio::fs::create_dir_all(&source)
            .await
            .map_err(|e| PipelineError::CreateDir {
                path: source.clone(),
                source: e,
            })?;

        let revision = self.config.revision();
        let handle = self.svn().checkout(&remote, &source, revision.as_deref())?;
        let out = self.execute(handle, Output::Echo, ExitWait::Bounded).await?;
        self.check_vcs("checkout", &out)?;
        Ok(StepOutcome::Continue)
    }

    fn image_dir(&self) -> PathBuf {
        Path::new(&self.local()).join(&self.env.settings.layout.image_dir)
    }

    fn script_session(&self, extra: Option<&str>) -> Vec<CommandLine> {
        let layout = &self.env.settings.layout;
        let mut script = CommandLine::new(layout.build_script.as_str()).arg(self.config.profile());
        if let Some(extra) = extra {
            script = script.arg(extra);
        }
        vec![CommandLine::new("cd").arg(self.local()), script]
    }

    async fn clean(&mut self) -> Result<StepOutcome, PipelineError> {
        let image_dir = self.image_dir();
        let suffix = &self.env.settings.layout.artifact_suffix;

        if image_dir.is_dir() {
            let mut entries = tokio::fs::read_dir(&image_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if !file_name.contains(suffix.as_str()) || !entry.path().is_file() {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => self.log(&format!("Delete {file_name}")),
                    Err(e) => warn!(task = %self.name, file = %file_name, error = %e, "failed to delete old artifact"),
                }
            }
        }

        let handle = self.env.runner.run_session(&self.script_session(Some("clean")))?;
        let out = self.execute(handle, Output::Echo, ExitWait::Natural).await?;
        if out.code != 0 {
            warn!(task = %self.name, exit_code = out.code, "clean target failed; continuing");
            self.log(&format!("Clean exited with code {}", out.code));
        }
        Ok(StepOutcome::Continue)
    }

    async fn compile(&mut self) -> Result<StepOutcome, PipelineError> {
        let handle = self.env.runner.run_session(&self.script_session(None))?;
        let out = self.execute(handle, Output::Echo, ExitWait::Natural).await?;
        if out.code != 0 {
            return Err(PipelineError::Compile(out.code));
        }
        self.log("Compile finished");
        Ok(StepOutcome::Continue)
    }

    async fn upload(&mut self) -> Result<StepOutcome, PipelineError> {
        let layout = &self.env.settings.layout;
        let artifact = find_artifact(&self.image_dir(), &layout.artifact_suffix).await?;

        let bytes = tokio::fs::metadata(&artifact).await?.len();
        if bytes < layout.min_artifact_size {
            return Err(PipelineError::ArtifactTooSmall {
                kib: bytes / 1024,
                bytes,
            });
        }

        let destination = self.config.upload(&self.env.layout);
        let (host, path) = split_destination(&destination)
            .ok_or_else(|| PipelineError::InvalidDestination(destination.clone()))?;
        let shell = RemoteShell::new(host, self.env.settings.upload.password.clone());

        self.provision(&shell, path).await?;
        self.transfer(&shell, &artifact, &destination).await?;
        Ok(StepOutcome::Continue)
    }

    /// Create every missing directory of `path` on the remote host, one
    /// segment at a time.
    async fn provision(&self, shell: &RemoteShell, path: &str) -> Result<(), PipelineError> {
        for dir in missing_candidates(&self.env.settings.upload.root, path) {
            let handle = self.env.runner.run(&shell.probe_dir(&dir))?;
            let probe = self.execute(handle, Output::Quiet, ExitWait::Bounded).await?;
            if probe.stdout.iter().any(|l| l.trim() == "Yes") {
                continue;
            }

            let handle = self.env.runner.run(&shell.mkdir(&dir))?;
            let made = self.execute(handle, Output::Quiet, ExitWait::Bounded).await?;
            if made.code != 0 {
                return Err(PipelineError::RemoteMkdir(format!("{dir}: {}", made.summary())));
            }
            self.log(&format!("Create upload path {dir}"));
        }
        Ok(())
    }

    async fn transfer(
        &self,
        shell: &RemoteShell,
        artifact: &Path,
        destination: &str,
    ) -> Result<(), PipelineError> {
        let settings = &self.env.settings.upload;
        let file = artifact.to_string_lossy();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let handle = self.env.runner.run(&shell.copy(&file, destination))?;
            let out = self.execute(handle, Output::Echo, ExitWait::Natural).await?;
            let lost = out.lines().any(|l| l.contains(LOST_CONNECTION));

            if out.code == 0 && !lost {
                self.log("Upload success");
                return Ok(());
            }

            let retriable = lost
                && attempt <= settings.max_retries
                && self.status.get() == TaskStatus::Working;
            if !retriable {
                return Err(PipelineError::Upload(out.summary()));
            }

            self.log(&format!(
                "Connection lost, retrying upload ({attempt}/{})",
                settings.max_retries
            ));
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(settings.retry_delay) => {}
            }
        }
    }
}

/// Last artifact (by file name) in `dir` whose name contains `suffix`.
async fn find_artifact(dir: &Path, suffix: &str) -> Result<PathBuf, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::InvalidImageDir(dir.display().to_string()));
    }

    let mut found: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && entry.file_name().to_string_lossy().contains(suffix) {
            found.push(path);
        }
    }
    found.sort();
    found.pop().ok_or(PipelineError::MissingArtifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plan_with_known_remote_and_working_copy() {
        let cfg = BuildConfig::new("r1", "router", "release").with_param("svn", "svn://r1");
        assert_eq!(
            plan(&cfg, WorkingCopy::Existing),
            vec![Step::Update, Step::Clean, Step::Compile, Step::Upload, Step::Done]
        );
    }

    #[test]
    fn plan_resolves_remote_first_when_unknown() {
        let cfg = BuildConfig::new("r1", "router", "release");
        assert_eq!(plan(&cfg, WorkingCopy::Existing)[0], Step::ResolveRemote);
    }

    #[test]
    fn plan_checks_out_missing_working_copy() {
        let cfg = BuildConfig::new("r1", "router", "release").with_param("svn", "svn://r1");
        assert_eq!(plan(&cfg, WorkingCopy::Missing)[0], Step::Checkout);
    }

    #[test]
    fn plan_skips_sync_when_update_disabled() {
        let cfg = BuildConfig::new("r1", "router", "release")
            .with_param("svn", "svn://r1")
            .with_param("update", json!(false));
        assert_eq!(
            plan(&cfg, WorkingCopy::Missing),
            vec![Step::Clean, Step::Compile, Step::Upload, Step::Done]
        );
    }

    #[test]
    fn working_copy_detection_looks_for_metadata_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(WorkingCopy::detect(dir.path(), ".svn"), WorkingCopy::Missing);
        std::fs::create_dir(dir.path().join(".svn")).unwrap();
        assert_eq!(WorkingCopy::detect(dir.path(), ".svn"), WorkingCopy::Existing);
    }

    #[tokio::test]
    async fn find_artifact_picks_last_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fw-001.tar.gz"), b"a").unwrap();
        std::fs::write(dir.path().join("fw-002.tar.gz"), b"b").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"c").unwrap();

        let found = find_artifact(dir.path(), "tar.gz").await.unwrap();
        assert_eq!(found.file_name().unwrap(), "fw-002.tar.gz");
    }

    #[tokio::test]
    async fn find_artifact_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_artifact(dir.path(), "tar.gz").await,
            Err(PipelineError::MissingArtifact)
        ));
        assert!(matches!(
            find_artifact(&dir.path().join("absent"), "tar.gz").await,
            Err(PipelineError::InvalidImageDir(_))
        ));
    }

    #[test]
    fn undersized_artifact_message_mentions_size() {
        let err = PipelineError::ArtifactTooSmall { kib: 0, bytes: 100 };
        assert_eq!(err.to_string(), "Image size is not right : 0KiB");
    }
}
