//! Tempo and musical lengths
//!
//! Follows the MIDI clock standard of 24 PPQN (pulses per quarter note) by
//! default. The pulse duration is derived from the BPM on every call so a
//! tempo change is visible to the very next computation.

use crate::error::CoreError;
use std::time::Duration;

/// Pulses per quarter note (MIDI standard)
pub const DEFAULT_PULSES_PER_BEAT: u32 = 24;

/// Beats per bar (4/4)
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Live tempo plus the fixed meter used to convert musical lengths to pulses.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tempo {
    bpm: f64,
    pulses_per_beat: u32,
    beats_per_bar: u32,
}

impl Tempo {
    /// Create a tempo in 4/4 at 24 PPQN
    pub fn new(bpm: f64) -> Result<Self, CoreError> {
        Self::with_meter(bpm, DEFAULT_PULSES_PER_BEAT, DEFAULT_BEATS_PER_BAR)
    }

    pub fn with_meter(
        bpm: f64,
        pulses_per_beat: u32,
        beats_per_bar: u32,
    ) -> Result<Self, CoreError> {
        check_bpm(bpm)?;
        if pulses_per_beat == 0 || beats_per_bar == 0 {
            return Err(CoreError::InvalidMeter {
                pulses_per_beat,
                beats_per_bar,
            });
        }
        Ok(Self {
            bpm,
            pulses_per_beat,
            beats_per_bar,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change the tempo. Takes effect on the next computed duration.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), CoreError> {
        check_bpm(bpm)?;
        self.bpm = bpm;
        Ok(())
    }

    pub fn pulses_per_beat(&self) -> u32 {
        self.pulses_per_beat
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn pulses_per_bar(&self) -> u32 {
        self.pulses_per_beat * self.beats_per_bar
    }

    /// Seconds per pulse: `60 / bpm / pulses_per_beat`
    pub fn pulse_seconds(&self) -> f64 {
        60.0 / self.bpm / self.pulses_per_beat as f64
    }

    /// Length of one pulse. Saturates at [`Duration::MAX`] for tempos too
    /// slow to represent.
    pub fn pulse_duration(&self) -> Duration {
        saturating_duration(self.pulse_seconds())
    }

    /// Wall-clock duration of `pulses` at the current tempo. Negative or
    /// NaN inputs collapse to zero; lengths too long to represent saturate
    /// at [`Duration::MAX`].
    pub fn duration_of(&self, pulses: f64) -> Duration {
        saturating_duration(self.pulse_seconds() * pulses)
    }

    /// Pulses in an n-th note (4 = quarter, 16 = sixteenth)
    pub fn th(&self, n: f64) -> f64 {
        self.pulses_per_bar() as f64 / n
    }

    /// Pulses in `n` bars
    pub fn bars(&self, n: f64) -> f64 {
        self.pulses_per_bar() as f64 * n
    }
}

/// Default tempo in BPM
pub const DEFAULT_BPM: f64 = 120.0;

impl Default for Tempo {
    /// 120 BPM in 4/4 at 24 PPQN
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            pulses_per_beat: DEFAULT_PULSES_PER_BEAT,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
        }
    }
}

/// Seconds to a [`Duration`], clamped to `0..=Duration::MAX`.
pub fn saturating_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn check_bpm(bpm: f64) -> Result<(), CoreError> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidTempo(bpm))
    }
}

/// Musical length representation
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Length {
    /// An n-th note: `Note(4.0)` is a quarter note, `Note(16.0)` a sixteenth
    Note(f64),
    /// Whole bars
    Bars(f64),
    /// Raw clock pulses
    Pulses(f64),
}

impl Length {
    /// Convert to pulses using the meter of `tempo`
    pub fn to_pulses(&self, tempo: &Tempo) -> f64 {
        match *self {
            Length::Note(n) => tempo.th(n),
            Length::Bars(n) => tempo.bars(n),
            Length::Pulses(p) => p,
        }
    }

    /// Shorthand kept from the live-coding notation: positive values are
    /// n-th notes, negative values are bars (`-2` = two bars).
    pub fn from_signed(value: f64) -> Self {
        if value < 0.0 {
            Length::Bars(-value)
        } else {
            Length::Note(value)
        }
    }
}
