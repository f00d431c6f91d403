// src/exec/vcs.rs

//! Subversion client.
//!
//! Thin wrapper over a [`ProcessRunner`]: every operation returns the
//! spawned [`ProcessHandle`] so the caller can stream its output into the
//! task log. Output parsing helpers live alongside.

use super::command::CommandLine;
use super::process::{ProcessHandle, ProcessRunner};
use crate::errors::Result;

/// Marker svn prints on stderr for every failed operation.
pub const ERROR_MARKER: &str = "svn: E";

/// Prompt svn prints when it needs credentials.
pub const AUTH_PROMPT: &str = "Authentication realm:";

#[derive(Debug, Clone, Copy)]
pub struct SvnClient<'a> {
    runner: &'a dyn ProcessRunner,
    program: &'a str,
}

impl<'a> SvnClient<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, program: &'a str) -> Self {
        Self { runner, program }
    }

    /// `svn info <target>`; `target` is a working copy path or a URL.
    pub fn info(&self, target: &str) -> Result<ProcessHandle> {
        self.runner.run(&self.info_command(target))
    }

    pub fn cleanup(&self, path: &str) -> Result<ProcessHandle> {
        self.runner.run(&self.cleanup_command(path))
    }

    pub fn update(&self, path: &str, revision: Option<&str>) -> Result<ProcessHandle> {
        self.runner.run(&self.update_command(path, revision))
    }

    pub fn checkout(&self, url: &str, path: &str, revision: Option<&str>) -> Result<ProcessHandle> {
        self.runner.run(&self.checkout_command(url, path, revision))
    }

    pub fn info_command(&self, target: &str) -> CommandLine {
        CommandLine::new(self.program).arg("info").arg(target)
    }

    pub fn cleanup_command(&self, path: &str) -> CommandLine {
        CommandLine::new(self.program).arg("cleanup").arg(path)
    }

    pub fn update_command(&self, path: &str, revision: Option<&str>) -> CommandLine {
        CommandLine::new(self.program)
            .arg("update")
            .arg(path)
            .arg_opt("-r", revision)
    }

    pub fn checkout_command(&self, url: &str, path: &str, revision: Option<&str>) -> CommandLine {
        CommandLine::new(self.program)
            .arg("checkout")
            .arg(url)
            .arg(path)
            .arg_opt("-r", revision)
    }
}

fn info_field<'l>(lines: &'l [String], key: &str) -> Option<&'l str> {
    lines.iter().rev().find_map(|line| {
        let value = line.strip_prefix(key)?.strip_prefix(':')?.trim();
        (!value.is_empty()).then_some(value)
    })
}

/// Repository URL from `svn info` output.
pub fn parse_url(lines: &[String]) -> Option<String> {
    info_field(lines, "URL").map(str::to_string)
}

/// Last changed revision from `svn info` output, falling back to the
/// `Revision:` line.
pub fn parse_revision(lines: &[String]) -> Option<String> {
    info_field(lines, "Last Changed Rev")
        .or_else(|| info_field(lines, "Revision"))
        .map(str::to_string)
}

/// `true` if any line carries svn's error marker.
pub fn has_error(lines: &[String]) -> bool {
    lines.iter().any(|l| l.contains(ERROR_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ShellRunner;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    const INFO: &str = "Path: r1\n\
        Working Copy Root Path: /src/router/r1\n\
        URL: svn://repo/router/r1/trunk\n\
        Revision: 1520\n\
        Node Kind: directory\n\
        Last Changed Author: dev\n\
        Last Changed Rev: 1498\n";

    #[test]
    fn parses_url_and_last_changed_revision() {
        let out = lines(INFO);
        assert_eq!(parse_url(&out).as_deref(), Some("svn://repo/router/r1/trunk"));
        assert_eq!(parse_revision(&out).as_deref(), Some("1498"));
    }

    #[test]
    fn revision_falls_back_to_revision_line() {
        let out = lines("URL: svn://x\nRevision: 77\n");
        assert_eq!(parse_revision(&out).as_deref(), Some("77"));
    }

    #[test]
    fn missing_fields_are_none() {
        let out = lines("svn: E155007: '/tmp/x' is not a working copy\n");
        assert_eq!(parse_url(&out), None);
        assert_eq!(parse_revision(&out), None);
        assert!(has_error(&out));
    }

    #[test]
    fn commands_include_pinned_revision() {
        let runner = ShellRunner;
        let svn = SvnClient::new(&runner, "svn");
        assert_eq!(
            svn.update_command("/src/r1", Some("12")).render(),
            "svn update /src/r1 -r 12"
        );
        assert_eq!(
            svn.checkout_command("svn://repo/r1", "/src/r1", None).render(),
            "svn checkout svn://repo/r1 /src/r1"
        );
    }
}
