//! Deadline scheduling
//!
//! Every `wait` of a track becomes a [`Deadline`] stored in that track's slot
//! inside the transport. Short waits (under the spin threshold) are slept
//! directly by the waiting routine. Longer waits count down on clock pulses;
//! when the countdown crosses the threshold the transport spawns one
//! [`trigger_deadline`] task that sleeps the fractional remainder and then
//! resolves the deadline.
//!
//! Resolution goes through `Shared::resolve_deadline` only, which checks
//! that the deadline still belongs to a live track before writing anything.

use crate::error::TrackId;
use crate::sleep::hybrid_sleep;
use crate::transport::Shared;
use metro_core::{CoreError, Countdown};
use std::rc::Weak;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DeadlineId(pub(crate) u64);

/// How a registered wait will come back
pub(crate) enum Wake {
    /// Nothing to wait for
    Now(f64),
    /// Short wait, slept by the caller
    Sleep(Duration),
    /// Counted down by the clock, resolved through the channel
    Tick(oneshot::Receiver<f64>),
}

pub(crate) struct Deadline {
    pub(crate) id: DeadlineId,
    pub(crate) countdown: Countdown,
    resolver: Option<oneshot::Sender<f64>>,
    trigger: Option<AbortHandle>,
}

impl Deadline {
    /// A wait counted down on clock pulses
    pub(crate) fn counted(
        id: DeadlineId,
        start: f64,
        pulses: f64,
    ) -> (Self, oneshot::Receiver<f64>) {
        let (tx, rx) = oneshot::channel();
        let deadline = Self {
            id,
            countdown: Countdown::new(start, pulses),
            resolver: Some(tx),
            trigger: None,
        };
        (deadline, rx)
    }

    /// A short wait the caller sleeps itself
    pub(crate) fn immediate(id: DeadlineId, start: f64, pulses: f64) -> Self {
        Self {
            id,
            countdown: Countdown::immediate(start, pulses),
            resolver: None,
            trigger: None,
        }
    }

    pub(crate) fn arm(&mut self, trigger: AbortHandle) {
        self.trigger = Some(trigger);
    }

    /// Scheduled -> Resolved. Hands the target to the waiter, if it is
    /// waiting on the channel.
    pub(crate) fn resolve(&mut self) -> Result<f64, CoreError> {
        let target = self.countdown.resolve()?;
        self.trigger = None;
        if let Some(resolver) = self.resolver.take() {
            let _ = resolver.send(target);
        }
        Ok(target)
    }

    /// Abort the in-flight trigger and close the channel without a value.
    pub(crate) fn cancel(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            trigger.abort();
        }
        if !self.countdown.is_settled() {
            let _ = self.countdown.cancel();
        }
        self.resolver = None;
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Final leg of a counted wait: sleep the remainder, then resolve.
pub(crate) async fn trigger_deadline(
    transport: Weak<Shared>,
    track: TrackId,
    deadline: DeadlineId,
    wait: Duration,
    resolution: Duration,
) {
    hybrid_sleep(wait, resolution).await;
    if let Some(shared) = transport.upgrade() {
        shared.resolve_deadline(track, deadline);
    }
}

/// Clears a deadline whose wait future is dropped before it resolved, so
/// the track can wait again and no trigger outlives the waiter.
pub(crate) struct DeadlineGuard {
    transport: Weak<Shared>,
    track: TrackId,
    deadline: DeadlineId,
}

impl DeadlineGuard {
    pub(crate) fn new(transport: Weak<Shared>, track: TrackId, deadline: DeadlineId) -> Self {
        Self {
            transport,
            track,
            deadline,
        }
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.transport.upgrade() {
            shared.abandon_deadline(self.track, self.deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metro_core::{DeadlineState, DEFAULT_SPIN_THRESHOLD};

    #[test]
    fn test_counted_deadline_sends_target() {
        let (mut deadline, mut rx) = Deadline::counted(DeadlineId(1), 4.0, 2.0);
        assert_eq!(deadline.countdown.tick(DEFAULT_SPIN_THRESHOLD), Some(1.0));
        assert_eq!(deadline.resolve(), Ok(6.0));
        assert_eq!(rx.try_recv(), Ok(6.0));
    }

    #[test]
    fn test_cancel_closes_channel() {
        let (mut deadline, mut rx) = Deadline::counted(DeadlineId(2), 0.0, 8.0);
        deadline.cancel();
        assert_eq!(deadline.countdown.state(), DeadlineState::Cancelled);
        assert!(rx.try_recv().is_err());
        assert!(deadline.resolve().is_err());
    }

    #[test]
    fn test_drop_cancels() {
        let (deadline, mut rx) = Deadline::counted(DeadlineId(3), 0.0, 8.0);
        drop(deadline);
        assert_eq!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed));
    }
}
