// src/exec/process.rs

//! Subprocess spawning and control.
//!
//! [`ProcessRunner`] is the seam the build pipeline talks to: production code
//! uses [`ShellRunner`], tests supply a runner that maps command lines onto
//! canned scripts. Either way the result is a [`ProcessHandle`] exposing the
//! child's stdout/stderr as line streams, its stdin, and its exit code.
//!
//! On Unix every child is started in its own process group so that
//! [`Terminator::terminate`] can kill the shell together with whatever it
//! spawned (compilers, `ssh`, ...).

use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::command::{CommandLine, session};
use crate::errors::Result;

/// Line stream over a child's output pipe.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD instead of ending
/// the stream, so a compiler running in a legacy locale is still drained to
/// EOF.
#[derive(Debug)]
pub struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its `\n` or `\r\n` terminator, `None` at EOF.
    ///
    /// Cancel safe: bytes of a partially read line stay buffered for the
    /// next call.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut end = self.buf.len();
        if self.buf.ends_with(b"\n") {
            end -= 1;
            if self.buf[..end].ends_with(b"\r") {
                end -= 1;
            }
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Exit code reported when a process was killed, timed out, or could not be
/// waited on.
pub const NO_EXIT_CODE: i32 = -1;

/// Trait abstracting how command lines become processes.
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    /// Spawn `line` under a shell.
    fn spawn_shell(&self, line: &str) -> Result<ProcessHandle>;

    fn run(&self, command: &CommandLine) -> Result<ProcessHandle> {
        self.spawn_shell(&command.render())
    }

    /// Run several commands in one shell session (`a && b && c`).
    fn run_session(&self, commands: &[CommandLine]) -> Result<ProcessHandle> {
        self.spawn_shell(&session(commands))
    }
}

/// Runner that spawns real shells.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn spawn_shell(&self, line: &str) -> Result<ProcessHandle> {
        ProcessHandle::spawn_shell(line)
    }
}

/// A running child process.
pub struct ProcessHandle {
    line: String,
    child: Child,
    pid: Option<u32>,
    stdout: Option<OutputLines<ChildStdout>>,
    stderr: Option<OutputLines<ChildStderr>>,
    stdin: Option<ChildStdin>,
    kill: CancellationToken,
    exited: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Spawn `line` under `sh -c` (`cmd /C` on Windows) with all three
    /// standard streams piped.
    pub fn spawn_shell(line: &str) -> Result<Self> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        };

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning shell for `{line}`"))?;

        let pid = child.id();
        let stdout = child.stdout.take().map(OutputLines::new);
        let stderr = child.stderr.take().map(OutputLines::new);
        let stdin = child.stdin.take();

        debug!(pid, cmd = %line, "spawned process");

        Ok(Self {
            line: line.to_string(),
            child,
            pid,
            stdout,
            stderr,
            stdin,
            kill: CancellationToken::new(),
            exited: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn command_line(&self) -> &str {
        &self.line
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<OutputLines<ChildStdout>> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<OutputLines<ChildStderr>> {
        self.stderr.take()
    }

    /// Write one line to the child's stdin.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        if let Some(stdin) = self.stdin.as_mut() {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }
        Ok(())
    }

    /// Cloneable handle that can kill this process from another task.
    pub fn terminator(&self) -> Terminator {
        Terminator {
            pid: self.pid,
            kill: self.kill.clone(),
            exited: Arc::clone(&self.exited),
        }
    }

    /// Wait for the process to exit on its own.
    ///
    /// Returns [`NO_EXIT_CODE`] if it was terminated through a
    /// [`Terminator`] while waiting.
    pub async fn wait(&mut self) -> i32 {
        let status = tokio::select! {
            status = self.child.wait() => status,
            _ = self.kill.cancelled() => {
                self.kill().await;
                return NO_EXIT_CODE;
            }
        };
        self.exited.store(true, Ordering::SeqCst);

        match status {
            Ok(status) => status.code().unwrap_or(NO_EXIT_CODE),
            Err(e) => {
                warn!(cmd = %self.line, error = %e, "failed to wait for process");
                NO_EXIT_CODE
            }
        }
    }

    /// Like [`wait`](Self::wait), bounded by `timeout`.
    pub async fn wait_exit_code(&mut self, timeout: Duration) -> i32 {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(code) => code,
            Err(_) => {
                debug!(cmd = %self.line, ?timeout, "process did not exit in time");
                NO_EXIT_CODE
            }
        }
    }

    /// Kill the process group and reap the child.
    pub async fn kill(&mut self) {
        if !self.exited.load(Ordering::SeqCst) {
            kill_group(self.pid);
        }
        if let Err(e) = self.child.kill().await {
            debug!(cmd = %self.line, error = %e, "kill on already finished process");
        }
        self.exited.store(true, Ordering::SeqCst);
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            kill_group(self.pid);
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("line", &self.line)
            .field("pid", &self.pid)
            .field("exited", &self.exited.load(Ordering::SeqCst))
            .finish()
    }
}

/// Kills a [`ProcessHandle`]'s process tree from outside the task that owns
/// the handle.
#[derive(Debug, Clone)]
pub struct Terminator {
    pid: Option<u32>,
    kill: CancellationToken,
    exited: Arc<AtomicBool>,
}

impl Terminator {
    /// Kill the process group immediately and wake whoever is waiting on the
    /// handle. No-op once the process has been reaped.
    pub fn terminate(&self) {
        if !self.exited.load(Ordering::SeqCst) {
            kill_group(self.pid);
        }
        self.kill.cancel();
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group id is the one we created
    // with `process_group(0)` and the leader has not been reaped yet.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
