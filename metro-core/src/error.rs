use crate::countdown::DeadlineState;
use thiserror::Error;

/// Errors raised by the pure core types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Tempo must be a finite, strictly positive BPM value.
    #[error("invalid tempo {0} BPM (must be finite and > 0)")]
    InvalidTempo(f64),
    /// Pulses per beat and beats per bar must be non-zero.
    #[error("invalid meter: {pulses_per_beat} pulses per beat, {beats_per_bar} beats per bar")]
    InvalidMeter {
        pulses_per_beat: u32,
        beats_per_bar: u32,
    },
    /// A deadline was asked to move between two states that are not adjacent.
    #[error("deadline cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: DeadlineState,
        to: DeadlineState,
    },
    /// A message was shorter than its status byte requires.
    #[error("truncated MIDI message: status {status:#04x} needs {expected} bytes, got {got}")]
    Truncated { status: u8, expected: usize, got: usize },
    /// An empty byte slice was handed to the decoder.
    #[error("empty MIDI message")]
    Empty,
}
