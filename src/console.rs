// src/console.rs

//! Interactive console on stdin.
//!
//! ```text
//! execute <name>   queue a build of a stored config
//! stop <name>      stop a task
//! status <name>    print a task's status
//! list             print every task in the pool
//! reload | save    reload / save the build list
//! exit [code]      shut down
//! ```

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::client::Client;
use crate::dispatch::{Actor, ActorContext};
use crate::errors::{MuppetError, Result};
use crate::events::{Event, EventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Execute(String),
    Stop(String),
    Status(String),
    List,
    Reload,
    Save,
    Exit(i32),
    Help,
    Unknown(String),
}

/// Splits a console line into verb and argument.
#[derive(Debug, Clone)]
pub struct CommandParser {
    line: Regex,
}

impl CommandParser {
    pub fn new() -> Result<Self> {
        let line = Regex::new(r"^\s*(?P<verb>\S+)(?:\s+(?P<arg>.*?))?\s*$")
            .map_err(|e| MuppetError::ConfigError(format!("console grammar: {e}")))?;
        Ok(Self { line })
    }

    /// `None` for blank lines.
    pub fn parse(&self, input: &str) -> Option<Command> {
        let caps = self.line.captures(input)?;
        let verb = caps.name("verb")?.as_str().to_lowercase();
        let arg = caps
            .name("arg")
            .map(|m| m.as_str().to_string())
            .filter(|a| !a.is_empty());

        let command = match (verb.as_str(), arg) {
            ("execute", Some(name)) => Command::Execute(name),
            ("stop", Some(name)) => Command::Stop(name),
            ("status", Some(name)) => Command::Status(name),
            ("list", None) => Command::List,
            ("reload", None) => Command::Reload,
            ("save", None) => Command::Save,
            ("exit", None) => Command::Exit(0),
            ("exit", Some(code)) => match code.parse() {
                Ok(code) => Command::Exit(code),
                Err(_) => Command::Unknown(input.trim().to_string()),
            },
            ("help", _) => Command::Help,
            _ => Command::Unknown(input.trim().to_string()),
        };
        Some(command)
    }
}

const HELP: &str = "commands: execute <name> | stop <name> | status <name> | list | reload | save | exit [code]";

/// Run one command and render its reply. `Exit` is handled by the caller.
pub async fn dispatch(client: &Client, command: Command) -> String {
    let reply = match command {
        Command::Execute(name) => client.execute(&name).await,
        Command::Stop(name) => client.stop_task(&name).await,
        Command::Status(name) => client.task_status(&name).await,
        Command::List => client.processing_list().await.map(|names| {
            if names.is_empty() {
                "(no tasks)".to_string()
            } else {
                names.join("\n")
            }
        }),
        Command::Reload => client.reload_configs().await,
        Command::Save => client.save_configs().await,
        Command::Exit(code) => Ok(format!("exit {code}")),
        Command::Help => Ok(HELP.to_string()),
        Command::Unknown(line) => Ok(format!("unknown command: {line}\n{HELP}")),
    };
    reply.unwrap_or_else(|e| format!("error: {e}"))
}

/// Actor that reads commands from stdin. Receives no events; it only
/// publishes requests.
#[derive(Debug)]
pub struct Console {
    parser: CommandParser,
}

impl Console {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: CommandParser::new()?,
        })
    }
}

impl Actor for Console {
    fn name(&self) -> &'static str {
        "console"
    }

    fn interests(&self) -> Vec<EventKind> {
        Vec::new()
    }

    async fn handle(&mut self, _event: Event, _ctx: &ActorContext) {}

    async fn started(&mut self, ctx: &ActorContext) {
        let parser = self.parser.clone();
        let client = Client::new(ctx.publisher().clone());
        let cancel = ctx.cancellation().clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => line,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed; console stops reading");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read console input");
                        break;
                    }
                };

                let Some(command) = parser.parse(&line) else {
                    continue;
                };
                if let Command::Exit(code) = command {
                    if let Err(e) = client.shutdown(code).await {
                        warn!(error = %e, "failed to request shutdown");
                    }
                    break;
                }
                println!("{}", dispatch(&client, command).await);
            }
        });
    }
}
