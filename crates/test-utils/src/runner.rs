use std::sync::{Arc, Mutex};

use muppet::errors::Result;
use muppet::exec::{ProcessHandle, ProcessRunner};

/// A process runner that:
/// - records every command line it is asked to run
/// - runs, instead of the real command, the script of the first rule whose
///   pattern occurs in the command line (or the default script)
/// - records the pid of every spawned shell.
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    rules: Arc<Mutex<Vec<(String, String)>>>,
    default_script: String,
    commands: Arc<Mutex<Vec<String>>>,
    pids: Arc<Mutex<Vec<u32>>>,
}

impl ScriptedRunner {
    /// Unmatched commands succeed silently.
    pub fn new() -> Self {
        Self::with_default("true")
    }

    pub fn with_default(script: &str) -> Self {
        Self {
            rules: Arc::new(Mutex::new(Vec::new())),
            default_script: script.to_string(),
            commands: Arc::new(Mutex::new(Vec::new())),
            pids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Commands containing `pattern` run `script` instead. Earlier rules win.
    pub fn on(self, pattern: &str, script: &str) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), script.to_string()));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Recorded command lines containing `needle`.
    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    pub fn ran(&self, needle: &str) -> bool {
        !self.commands_matching(needle).is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids.lock().unwrap().clone()
    }

    fn script_for(&self, line: &str) -> String {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| self.default_script.clone())
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn spawn_shell(&self, line: &str) -> Result<ProcessHandle> {
        self.commands.lock().unwrap().push(line.to_string());
        let handle = ProcessHandle::spawn_shell(&self.script_for(line))?;
        if let Some(pid) = handle.pid() {
            self.pids.lock().unwrap().push(pid);
        }
        Ok(handle)
    }
}

/// `true` while a process with `pid` exists (zombies included).
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence and permissions.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}
