//! Command registry for REPL commands
//!
//! Commands run on the REPL thread. Anything that touches the transport is
//! sent to the engine as a [`ControlCommand`] and answered over a reply
//! channel, so the REPL never calls into the scheduler directly.

pub mod general;
pub mod transport;

use crate::engine::{ControlCommand, ControlReply, ControlRequest};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a command waits for the engine to answer
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of executing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Command executed successfully, continue REPL
    Success,
    /// Command executed, show this message
    Message(String),
    /// Exit the REPL
    Exit,
    /// No command matches the input
    NotACommand,
    /// Error occurred
    Error(String),
}

/// Context passed to command handlers
pub struct CommandContext {
    control: mpsc::Sender<ControlRequest>,
    timeout: Duration,
}

impl CommandContext {
    pub fn new(control: mpsc::Sender<ControlRequest>) -> Self {
        Self {
            control,
            timeout: REPLY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a command to the engine and block until it answers.
    /// Must not be called from inside the async runtime.
    pub fn request(&self, command: ControlCommand) -> Result<ControlReply, String> {
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.control
            .blocking_send(ControlRequest { command, reply })
            .map_err(|_| "engine is not running".to_string())?;
        answer
            .recv_timeout(self.timeout)
            .map_err(|_| "engine did not answer in time".to_string())
    }
}

/// A command handler function
pub type CommandHandler = fn(&str, &mut CommandContext) -> CommandResult;

/// Registry of available commands
pub struct CommandRegistry {
    /// Sorted by prefix length descending for longest-match-first lookup
    commands: Vec<(String, CommandHandler)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Register a command with its prefix
    pub fn register(&mut self, prefix: &str, handler: CommandHandler) {
        self.commands.push((prefix.to_string(), handler));
        self.commands.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Execute a command, returning NotACommand if no match found
    pub fn execute(&self, input: &str, ctx: &mut CommandContext) -> CommandResult {
        for (prefix, handler) in &self.commands {
            if input == prefix || input.starts_with(&format!("{} ", prefix)) {
                let args = input[prefix.len()..].trim();
                return handler(args, ctx);
            }
        }
        CommandResult::NotACommand
    }

    /// Get all registered command prefixes
    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a fully populated command registry with all built-in commands
pub fn create_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    registry.register("start", transport::cmd_start);
    registry.register("stop", transport::cmd_stop);
    registry.register("continue", transport::cmd_continue);
    registry.register("status", transport::cmd_status);
    registry.register("tracks", transport::cmd_tracks);
    registry.register("panic", transport::cmd_panic);

    registry.register("tempo", general::cmd_tempo);
    registry.register("help", general::cmd_help);
    registry.register("quit", general::cmd_quit);
    registry.register("exit", general::cmd_quit);

    registry
}

/// Turn an engine reply into REPL output
pub(crate) fn reply_result(reply: Result<ControlReply, String>) -> CommandResult {
    match reply {
        Ok(ControlReply::Error(message)) | Err(message) => CommandResult::Error(message),
        Ok(ControlReply::Done(message)) => CommandResult::Message(message),
        Ok(other) => CommandResult::Message(format!("{other:?}")),
    }
}
