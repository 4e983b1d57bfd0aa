//! Built-in commands for the standalone server.
//!
//! When the server runs on its own there is no host application to execute
//! commands, so the binary plugs in this small executor instead.
//!
//! - `help` - list commands
//! - `ping` - reply with `Pong!`
//! - `echo <text>` - reply with `<text>`
//! - `version` - server version
//! - `uptime` - seconds since start

use crate::host::{CommandExecutor, ExecutorError, Notifier};
use crate::session::ResponseSink;
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

const HELP: &[&str] = &[
    "help - list commands",
    "ping - check the connection",
    "echo <text> - repeat <text>",
    "version - show the server version",
    "uptime - seconds since start",
    "stop - shut the server down",
];

/// Executor backing the standalone binary.
#[derive(Debug)]
pub struct BuiltinExecutor {
    started: Instant,
}

impl BuiltinExecutor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for BuiltinExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for BuiltinExecutor {
    async fn execute(&self, sink: &mut ResponseSink, command: &str) -> Result<bool, ExecutorError> {
        let (name, args) = match command.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (command, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "help" => HELP.iter().for_each(|line| sink.send(*line)),
            "ping" => sink.send("Pong!"),
            "echo" => sink.send(args),
            "version" => sink.send(format!("rcon-server {}", crate::VERSION)),
            "uptime" => sink.send(format!("{}s", self.started.elapsed().as_secs())),
            _ => return Ok(false),
        }

        Ok(true)
    }
}

/// Notifier that writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, permission: &str, message: &str) {
        info!(permission = permission, "{}", message);
    }
}
