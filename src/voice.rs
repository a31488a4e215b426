//! User routines
//!
//! A [`Voice`] is anything that can be started on a [`Track`]. Plain async
//! functions and closures returning futures qualify automatically:
//!
//! ```ignore
//! async fn bass(track: Track) -> anyhow::Result<()> {
//!     loop {
//!         track.play(36, track.th(8.0), 100, 0.5).await?;
//!     }
//! }
//! ```
//!
//! Routines run cooperatively on one thread. A routine that loops without
//! awaiting `wait`/`play` starves every other track and the clock.

use crate::track::Track;
use std::future::Future;
use std::pin::Pin;

/// Boxed, non-`Send` future
pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

pub trait Voice {
    fn run(&self, track: Track) -> LocalBoxFuture<anyhow::Result<()>>;
}

impl<F, Fut> Voice for F
where
    F: Fn(Track) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    fn run(&self, track: Track) -> LocalBoxFuture<anyhow::Result<()>> {
        Box::pin(self(track))
    }
}
