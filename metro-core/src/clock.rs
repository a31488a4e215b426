//! Pulse clock
//!
//! Authoritative pulse position for a performance. Advanced exactly once per
//! clock pulse by whoever owns it; records the wall-clock delta between
//! pulses and how much that delta moved relative to the previous one.
//!
//! Position 0 means "not started". [`Clock::start`] marks the first active
//! pulse as position 1.

use crate::tempo::Tempo;
use std::time::Instant;

/// Diagnostics for a single pulse.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TickRecord {
    /// Seconds since the previous pulse (0 on the first pulse)
    pub delta: f64,
    /// Change of `delta` against the previous delta, in percent of the
    /// expected pulse length
    pub jitter: f64,
    /// Clock position after this pulse
    pub position: u64,
}

#[derive(Debug, Clone)]
pub struct Clock {
    tempo: Tempo,
    position: u64,
    last_tick: Option<Instant>,
    previous_delta: Option<f64>,
}

impl Clock {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            position: 0,
            last_tick: None,
            previous_delta: None,
        }
    }

    pub fn tempo(&self) -> &Tempo {
        &self.tempo
    }

    pub fn tempo_mut(&mut self) -> &mut Tempo {
        &mut self.tempo
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_started(&self) -> bool {
        self.position > 0
    }

    /// Mark the first active pulse
    pub fn start(&mut self) {
        self.position = 1;
        self.clear_history();
    }

    /// Back to "not started"
    pub fn reset(&mut self) {
        self.position = 0;
        self.clear_history();
    }

    /// Absolute reposition (song position pointer). Tick history is dropped
    /// because the next delta would otherwise span the jump.
    pub fn set_position(&mut self, position: u64) {
        self.position = position;
        self.clear_history();
    }

    /// Advance by one pulse.
    pub fn tick(&mut self, now: Instant) -> TickRecord {
        let delta = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        let jitter = match (self.last_tick, self.previous_delta) {
            (Some(_), Some(previous)) => (delta - previous) * 100.0 / self.tempo.pulse_seconds(),
            _ => 0.0,
        };
        if self.last_tick.is_some() {
            self.previous_delta = Some(delta);
        }
        self.last_tick = Some(now);
        self.position += 1;

        TickRecord {
            delta,
            jitter,
            position: self.position,
        }
    }

    /// Pulse within the current beat (0 on the beat). Undefined before start.
    pub fn pulse_in_beat(&self) -> u64 {
        self.position.saturating_sub(1) % self.tempo.pulses_per_beat() as u64
    }

    /// Returns true if the current pulse is on a beat boundary
    pub fn is_beat_boundary(&self) -> bool {
        self.is_started() && self.pulse_in_beat() == 0
    }

    /// Returns true if the current pulse is on a bar boundary
    pub fn is_bar_boundary(&self) -> bool {
        self.is_started()
            && self.position.saturating_sub(1) % self.tempo.pulses_per_bar() as u64 == 0
    }

    fn clear_history(&mut self) {
        self.last_tick = None;
        self.previous_delta = None;
    }
}
