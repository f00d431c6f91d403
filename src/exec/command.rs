// src/exec/command.rs

//! Command lines rendered for `sh -c`.

use std::fmt;

/// A program and its arguments.
///
/// Rendering quotes every argument that is not made of shell-safe
/// characters, so paths with spaces and remote commands survive the trip
/// through `sh -c` as single words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `arg` only when present.
    pub fn arg_opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    pub fn program(&self) -> &str {
        &self.args[0]
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Shell form of this command.
    pub fn render(&self) -> String {
        self.args
            .iter()
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Join commands into one shell session; each runs only if the previous
/// one succeeded.
pub fn session(commands: &[CommandLine]) -> String {
    commands
        .iter()
        .map(CommandLine::render)
        .collect::<Vec<_>>()
        .join(" && ")
}

fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:@%+=,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arguments_are_left_alone() {
        let cmd = CommandLine::new("svn")
            .arg("update")
            .arg("../../router/r1")
            .arg_opt("-r", Some("42"));
        assert_eq!(cmd.render(), "svn update ../../router/r1 -r 42");
    }

    #[test]
    fn unsafe_arguments_are_single_quoted() {
        let cmd = CommandLine::new("ssh")
            .arg("u@h")
            .arg("[ -d /a b ] && echo Yes")
            .arg("it's")
            .arg("");
        assert_eq!(
            cmd.render(),
            r#"ssh u@h '[ -d /a b ] && echo Yes' 'it'\''s' ''"#
        );
    }

    #[test]
    fn session_chains_with_and() {
        let line = session(&[
            CommandLine::new("cd").arg("/src/r1"),
            CommandLine::new("./mkfw.sh").arg("release"),
        ]);
        assert_eq!(line, "cd /src/r1 && ./mkfw.sh release");
    }
}
