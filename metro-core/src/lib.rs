//! # Metro Core
//!
//! Runtime-free building blocks for the metro performance scheduler.
//! Everything here is synchronous and allocation-light so it can be driven
//! from the real-time consumer loop without pulling in an executor.
//!
//! ## Modules
//!
//! - `midi`: status constants, the [`MidiMessage`] output command and the
//!   [`TransportEvent`] input event with its song-position arithmetic.
//! - `tempo`: [`Tempo`] (BPM, pulses per beat, beats per bar) and [`Length`].
//! - `clock`: the pulse [`Clock`] with delta/jitter bookkeeping.
//! - `countdown`: the [`Countdown`] deadline state machine.
//! - `note`, `scale`, `overlay`: small musical lookup tables used by voices.
//!
//! ## Features
//!
//! - **serde**: derive `Serialize`/`Deserialize` for the plain data types
//!
//! ## Example
//!
//! ```
//! use metro_core::{Clock, Tempo};
//! use std::time::Instant;
//!
//! let mut clock = Clock::new(Tempo::new(120.0).unwrap());
//! clock.start();
//! let record = clock.tick(Instant::now());
//! assert_eq!(record.position, 2);
//! ```

pub mod clock;
pub mod countdown;
pub mod error;
pub mod midi;
pub mod note;
pub mod overlay;
pub mod scale;
pub mod tempo;

pub use clock::{Clock, TickRecord};
pub use countdown::{Countdown, DeadlineState, DEFAULT_SPIN_THRESHOLD};
pub use error::CoreError;
pub use midi::{MidiBytes, MidiMessage, TransportEvent};
pub use overlay::Overlay;
pub use scale::Scale;
pub use tempo::{Length, Tempo};
