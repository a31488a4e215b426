//! Transport REPL commands

use crate::commands::{reply_result, CommandContext, CommandResult};
use crate::engine::{ControlCommand, ControlReply};
use colored::*;

/// Handle `start` command
pub fn cmd_start(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.request(ControlCommand::Start) {
        Ok(ControlReply::Done(_)) => {
            CommandResult::Message("▶ Transport started".bright_green().to_string())
        }
        other => reply_result(other),
    }
}

/// Handle `stop` command
pub fn cmd_stop(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.request(ControlCommand::Stop) {
        Ok(ControlReply::Done(_)) => {
            CommandResult::Message("■ Transport stopped".yellow().to_string())
        }
        other => reply_result(other),
    }
}

/// Handle `continue` command
pub fn cmd_continue(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.request(ControlCommand::Continue) {
        Ok(ControlReply::Done(message)) => {
            CommandResult::Message(format!("▶ {}", message).bright_green().to_string())
        }
        other => reply_result(other),
    }
}

/// Handle `panic` command - all notes off everywhere
pub fn cmd_panic(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.request(ControlCommand::Panic) {
        Ok(ControlReply::Done(_)) => CommandResult::Message(
            "🎹 Panic: All Notes Off sent to all channels"
                .yellow()
                .to_string(),
        ),
        other => reply_result(other),
    }
}

/// Handle `status` command
pub fn cmd_status(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.request(ControlCommand::Status) {
        Ok(ControlReply::Status(status)) => {
            let mut output = format!("{}\n", "🎛️  Transport Status:".bold());
            let state = status.state.to_string();
            let state = if status.state == crate::transport::TransportState::Running {
                state.green().bold()
            } else {
                state.yellow()
            };
            output.push_str(&format!("  State: {}\n", state));
            output.push_str(&format!("  Tempo: {:.1} BPM\n", status.bpm));
            output.push_str(&format!("  Position: pulse {}\n", status.position));
            output.push_str(&format!("  Clock: {}\n", status.clock.to_string().cyan()));
            output.push_str(&format!("  Tracks: {}", status.tracks));
            CommandResult::Message(output)
        }
        other => reply_result(other),
    }
}

/// Handle `tracks` command
pub fn cmd_tracks(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.request(ControlCommand::Tracks) {
        Ok(ControlReply::Tracks(tracks)) if tracks.is_empty() => {
            CommandResult::Message("No active tracks".to_string())
        }
        Ok(ControlReply::Tracks(tracks)) => {
            let mut output = format!("🎛️  Active Tracks ({}):\n", tracks.len());
            for track in tracks {
                let marker = if track.waiting { "▶ waiting" } else { "· running" };
                output.push_str(&format!(
                    "  {} {} ch {} @ {:.2} {}{}\n",
                    track.id,
                    track.name.cyan(),
                    track.channel + 1,
                    track.position,
                    marker,
                    if track.sounding > 0 {
                        format!(", {} sounding", track.sounding)
                    } else {
                        String::new()
                    }
                ));
            }
            CommandResult::Message(output.trim_end().to_string())
        }
        other => reply_result(other),
    }
}
