//! # Metro
//!
//! Metro runs live-coded MIDI performances locked to a clock pulse stream.
//! Routines ([`Voice`]s) run as cooperative tasks on [`Track`]s and express
//! time in pulses: `track.play(60, 24.0, 100, 0.5).await` sounds a note for
//! half a beat and returns once a full beat has passed. A [`Transport`]
//! advances the pulse clock, counts down every outstanding wait and
//! finishes each one with a short high-resolution sleep.
//!
//! Everything scheduling-related runs on one thread inside a
//! `tokio::task::LocalSet`. MIDI input and the REPL live on their own threads
//! and talk to the [`engine::Engine`] through bounded queues.
//!
//! ## Modules
//!
//! - `transport`, `track`, `scheduler`: the pulse clock owner, the track
//!   handle and the deadline machinery behind `wait`.
//! - `engine`: the single consumer loop (internal or external clock).
//! - `sleep`: hybrid timer-then-spin sleep.
//! - `output`, `midi`: output sinks and the midir ports.
//! - `log`: buffered timing diagnostics.
//! - `config`, `commands`, `repl`, `voices`: the application around it.

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod midi;
pub mod output;
pub mod repl;
mod scheduler;
pub mod sleep;
pub mod track;
pub mod transport;
pub mod voice;
pub mod voices;

pub use crate::config::{ClockSource, Config};
pub use crate::engine::{ControlCommand, ControlReply, Engine, InboundEvent};
pub use crate::error::{MetroError, Result, TrackId};
pub use crate::output::{OutputSink, RecordingSink, TraceSink};
pub use crate::track::{Notes, Track, Velocity};
pub use crate::transport::{TrackInfo, Transport, TransportSettings, TransportState};
pub use crate::voice::Voice;
pub use metro_core::{Length, MidiMessage, Overlay, Scale, Tempo, TransportEvent};
