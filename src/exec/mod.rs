// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] builds shell-quoted command lines and sessions.
//! - [`process`] provides the [`ProcessRunner`] trait, the production
//!   [`ShellRunner`], and the [`ProcessHandle`]/[`Terminator`] pair used to
//!   stream output from and kill subprocesses.
//! - [`vcs`] wraps the Subversion client and parses its output.
//! - [`remote`] builds the `ssh`/`scp` commands used for uploads.

pub mod command;
pub mod process;
pub mod remote;
pub mod vcs;

pub use command::{CommandLine, session};
pub use process::{NO_EXIT_CODE, OutputLines, ProcessHandle, ProcessRunner, ShellRunner, Terminator};
pub use remote::RemoteShell;
pub use vcs::SvnClient;
