//! Deadline countdown
//!
//! A pending "wake me in N pulses" request. The owner decrements it once per
//! clock pulse; when the remaining distance drops under the spin threshold
//! the countdown hands back the fractional remainder exactly once, so the
//! caller can finish the wait with a precise sleep instead of another pulse.
//!
//! State moves strictly forward:
//!
//! ```text
//! Pending -> Scheduled -> Resolved
//!    \           \
//!     `-----------`--> Cancelled
//! ```

use crate::error::CoreError;

/// Waits shorter than this many pulses are slept directly instead of being
/// counted down by the clock: one pulse plus twice the 1 ms sleep resolution.
pub const DEFAULT_SPIN_THRESHOLD: f64 = 1.0 + 2.0 * 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeadlineState {
    /// Counting down on clock pulses
    Pending,
    /// Final sleep is in flight
    Scheduled,
    Resolved,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    target: f64,
    remaining: f64,
    state: DeadlineState,
}

impl Countdown {
    /// Countdown of `pulses` starting from position `start`
    pub fn new(start: f64, pulses: f64) -> Self {
        Self {
            target: start + pulses,
            remaining: pulses,
            state: DeadlineState::Pending,
        }
    }

    /// A short wait that skips the countdown and is slept right away
    pub fn immediate(start: f64, pulses: f64) -> Self {
        Self {
            target: start + pulses,
            remaining: pulses,
            state: DeadlineState::Scheduled,
        }
    }

    /// Position the owner will hold once this resolves
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn state(&self) -> DeadlineState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == DeadlineState::Pending
    }

    /// Resolved or cancelled
    pub fn is_settled(&self) -> bool {
        matches!(self.state, DeadlineState::Resolved | DeadlineState::Cancelled)
    }

    /// Count one clock pulse. Returns the remaining pulses (never negative)
    /// the one time the countdown crosses `threshold`; the countdown is then
    /// `Scheduled` and later pulses are ignored.
    pub fn tick(&mut self, threshold: f64) -> Option<f64> {
        if self.state != DeadlineState::Pending {
            return None;
        }
        self.remaining -= 1.0;
        if self.remaining < threshold {
            self.state = DeadlineState::Scheduled;
            Some(self.remaining.max(0.0))
        } else {
            None
        }
    }

    /// Scheduled -> Resolved. Yields the target position.
    pub fn resolve(&mut self) -> Result<f64, CoreError> {
        self.transition(DeadlineState::Resolved)?;
        Ok(self.target)
    }

    /// Pending/Scheduled -> Cancelled
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        self.transition(DeadlineState::Cancelled)
    }

    fn transition(&mut self, to: DeadlineState) -> Result<(), CoreError> {
        let allowed = matches!(
            (self.state, to),
            (DeadlineState::Scheduled, DeadlineState::Resolved)
                | (DeadlineState::Pending, DeadlineState::Cancelled)
                | (DeadlineState::Scheduled, DeadlineState::Cancelled)
        );
        if !allowed {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
