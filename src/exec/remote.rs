// src/exec/remote.rs

//! Remote shell commands for artifact upload.

use super::command::CommandLine;

/// Builds `ssh`/`scp` invocations against one host, wrapped with
/// `sshpass -p` when a password is configured.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    host: String,
    password: Option<String>,
}

impl RemoteShell {
    /// `host` is the `user@address` part of a destination.
    pub fn new(host: impl Into<String>, password: Option<String>) -> Self {
        Self {
            host: host.into(),
            password,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn base(&self, program: &str) -> CommandLine {
        match &self.password {
            Some(pw) => CommandLine::new("sshpass").arg("-p").arg(pw.as_str()).arg(program),
            None => CommandLine::new(program),
        }
    }

    /// Prints `Yes` when `path` is a directory on the remote host, `No`
    /// otherwise.
    pub fn probe_dir(&self, path: &str) -> CommandLine {
        self.base("ssh")
            .arg(self.host.as_str())
            .arg(format!("[ -d '{path}' ] && echo Yes || echo No"))
    }

    pub fn mkdir(&self, path: &str) -> CommandLine {
        self.base("ssh")
            .arg(self.host.as_str())
            .arg("mkdir")
            .arg(path)
    }

    /// Copy a local file to `destination` (`user@host:/path`).
    pub fn copy(&self, file: &str, destination: &str) -> CommandLine {
        self.base("scp").arg(file).arg(destination)
    }
}

/// Split `user@host:/path` into its host and path parts.
pub fn split_destination(destination: &str) -> Option<(&str, &str)> {
    let (host, path) = destination.split_once(':')?;
    if host.is_empty() || !path.starts_with('/') {
        return None;
    }
    Some((host, path))
}

/// Directories to make sure exist, outermost first, for `path` below
/// `root`. When `path` is not under `root` every segment is listed.
pub fn missing_candidates(root: &str, path: &str) -> Vec<String> {
    let root = root.trim_end_matches('/');
    let (mut current, rest) = match path.strip_prefix(root) {
        Some(rest) if !root.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
            (root.to_string(), rest)
        }
        _ => (String::new(), path),
    };

    let mut dirs = Vec::new();
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        dirs.push(current.clone());
    }
    dirs
}
