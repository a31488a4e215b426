//! General REPL commands (help, quit, tempo)

use crate::commands::{CommandContext, CommandResult};
use crate::engine::{ControlCommand, ControlReply};
use colored::*;

/// Handle `help` command
pub fn cmd_help(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    print_help();
    CommandResult::Success
}

/// Handle `quit` or `exit` command
pub fn cmd_quit(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    CommandResult::Exit
}

/// Handle `tempo [bpm]` command
pub fn cmd_tempo(args: &str, ctx: &mut CommandContext) -> CommandResult {
    let command = if args.is_empty() {
        ControlCommand::Tempo(None)
    } else {
        match args.parse::<f64>() {
            Ok(bpm) if bpm > 0.0 && bpm <= 400.0 => ControlCommand::Tempo(Some(bpm)),
            _ => {
                return CommandResult::Error(
                    "Invalid tempo. Use a value between 1-400 BPM".to_string(),
                )
            }
        }
    };

    match ctx.request(command) {
        Ok(ControlReply::Tempo(bpm)) if args.is_empty() => {
            CommandResult::Message(format!("Current tempo: {:.1} BPM", bpm))
        }
        Ok(ControlReply::Tempo(bpm)) => CommandResult::Message(
            format!("🎵 Tempo set to {:.1} BPM", bpm)
                .bright_green()
                .to_string(),
        ),
        other => super::reply_result(other),
    }
}

/// Print help information
fn print_help() {
    println!("{}", "🎵 Metro Help".bold());
    println!("{}", "=============".bold());
    println!();
    println!("{}", "Transport:".green());
    println!("  {}            - Reset to pulse 0 and start", "start".cyan());
    println!("  {}             - Stop all tracks and silence output", "stop".cyan());
    println!("  {}         - Resume from the current position", "continue".cyan());
    println!("  {}            - Silence every sounding note", "panic".cyan());
    println!();
    println!("{}", "Tempo:".green());
    println!("  {}            - Show current tempo", "tempo".cyan());
    println!("  {}      - Set tempo", "tempo <bpm>".cyan());
    println!();
    println!("{}", "Inspection:".green());
    println!("  {}           - Transport state and position", "status".cyan());
    println!("  {}           - List live tracks", "tracks".bright_green());
    println!();
    println!("{}", "Other Commands:".green());
    println!("  {}             - Show this help", "help".bright_green());
    println!("  {}             - Stop and exit", "quit".bright_red());
}
