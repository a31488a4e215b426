//! REPL (Read-Eval-Print Loop) for controlling a running engine
//!
//! Runs on its own thread. Line editing happens on a second thread so the
//! command loop can also notice the engine going away while a prompt is open.

use crate::commands::{create_registry, CommandContext, CommandRegistry, CommandResult};
use crate::engine::{ControlCommand, ControlRequest};
use anyhow::Result;
use colored::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RustylineResult};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// One line from the editor thread
type Input = std::result::Result<String, ReadlineError>;

/// Interactive command line for a running engine
pub struct Repl {
    editor: Option<DefaultEditor>,
    registry: CommandRegistry,
    ctx: CommandContext,
    tx_input: Sender<Input>,
    rx_input: Receiver<Input>,
    /// Disconnects when the engine has finished
    engine_done: Receiver<()>,
}

impl Repl {
    pub fn new(
        control: mpsc::Sender<ControlRequest>,
        engine_done: Receiver<()>,
    ) -> RustylineResult<Self> {
        let editor = DefaultEditor::new()?;
        let (tx_input, rx_input) = unbounded();
        Ok(Repl {
            editor: Some(editor),
            registry: create_registry(),
            ctx: CommandContext::new(control),
            tx_input,
            rx_input,
            engine_done,
        })
    }

    /// Execute one line. Returns false once the REPL should end.
    pub fn handle_line(&mut self, line: &str) -> bool {
        match self.registry.execute(line, &mut self.ctx) {
            CommandResult::Success => true,
            CommandResult::Message(msg) => {
                println!("{}", msg);
                true
            }
            CommandResult::Exit => {
                self.shutdown();
                false
            }
            CommandResult::Error(e) => {
                println!("{} {}", "Error:".bright_red().bold(), e.red());
                true
            }
            CommandResult::NotACommand => {
                println!(
                    "{} unknown command '{}', try {}",
                    "Error:".bright_red().bold(),
                    line,
                    "help".bright_green()
                );
                true
            }
        }
    }

    fn shutdown(&self) {
        if let Err(e) = self.ctx.request(ControlCommand::Shutdown) {
            tracing::debug!(error = %e, "shutdown request not answered");
        }
        println!("{} 🎵", "Goodbye!".bright_cyan());
    }

    pub fn run(&mut self) -> Result<()> {
        println!(
            "{} {}",
            "🎵".bright_yellow(),
            "Metro performance scheduler".bright_cyan().bold()
        );
        println!(
            "Type '{}' for commands, '{}' or {} to stop and exit.\n",
            "help".bright_green(),
            "quit".bright_red(),
            "Ctrl+C".bright_red()
        );

        let mut editor = self
            .editor
            .take()
            .ok_or_else(|| anyhow::anyhow!("REPL is already running"))?;
        let tx_input = self.tx_input.clone();

        thread::spawn(move || loop {
            let prompt = format!("{} ", "metro>".bright_magenta().bold());
            match editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        let _ = editor.add_history_entry(&line);
                    }
                    if tx_input.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx_input.send(Err(err));
                    break;
                }
            }
        });

        loop {
            crossbeam_channel::select! {
                recv(self.rx_input) -> input => match input {
                    Ok(Ok(line)) => {
                        if line.is_empty() {
                            continue;
                        }
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    Ok(Err(ReadlineError::Interrupted | ReadlineError::Eof)) => {
                        self.shutdown();
                        break;
                    }
                    Ok(Err(err)) => {
                        println!(
                            "{} {}",
                            "Error reading input:".bright_red().bold(),
                            err.to_string().red()
                        );
                        self.shutdown();
                        break;
                    }
                    Err(_) => break,
                },

                recv(self.engine_done) -> _ => break,
            }
        }

        Ok(())
    }
}

/// Start the REPL on its own thread
pub fn spawn(
    control: mpsc::Sender<ControlRequest>,
    engine_done: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let mut repl = Repl::new(control, engine_done)
        .map_err(|e| anyhow::anyhow!("Failed to initialize REPL: {}", e))?;
    let handle = thread::Builder::new().name("repl".to_string()).spawn(move || {
        if let Err(e) = repl.run() {
            eprintln!("{} {}", "REPL error:".bright_red().bold(), e);
        }
    })?;
    Ok(handle)
}
