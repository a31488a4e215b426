//! Hybrid sleep
//!
//! [`hybrid_sleep`] sleeps on the runtime timer until one `resolution` before
//! the deadline and then polls the wall clock, yielding to the executor on
//! every iteration so other tracks keep running during the spin.

use std::time::{Duration, Instant};

/// Default spin window before a deadline
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(1);

/// Suspend the current task for `duration`. Never returns early; overshoot
/// is on the order of `resolution`. A duration past the end of the clock
/// never completes.
pub async fn hybrid_sleep(duration: Duration, resolution: Duration) {
    match Instant::now().checked_add(duration) {
        Some(deadline) => sleep_until(deadline, resolution).await,
        None => std::future::pending().await,
    }
}

/// Suspend the current task until the absolute `deadline`.
pub async fn sleep_until(deadline: Instant, resolution: Duration) {
    let now = Instant::now();
    if let Some(coarse) = deadline
        .checked_duration_since(now)
        .and_then(|rest| rest.checked_sub(resolution))
    {
        if !coarse.is_zero() {
            tokio::time::sleep(coarse).await;
        }
    }
    while Instant::now() < deadline {
        tokio::task::yield_now().await;
    }
}
