use metro_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Identity of a track within one transport. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub(crate) u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result alias that carries [`MetroError`].
pub type Result<T> = std::result::Result<T, MetroError>;

#[derive(Debug, Error)]
pub enum MetroError {
    /// `wait`/`play` while the track already has an outstanding deadline.
    /// A bug in the routine: it ends that track only.
    #[error("track '{track}' is already waiting")]
    AlreadyWaiting { track: String },
    /// The named MIDI port could not be found or opened. Fatal at startup.
    #[error("MIDI endpoint '{0}' is not available")]
    EndpointUnavailable(String),
    /// A routine returned an error or panicked.
    #[error("routine of track '{track}' failed: {message}")]
    RoutineFailure { track: String, message: String },
    /// The track was cancelled (or its transport dropped) while the caller
    /// was using it. Propagate it; do not swallow it.
    #[error("track {track} was cancelled")]
    Cancelled { track: TrackId },
    #[error("transport is not running")]
    NotRunning,
    #[error("transport is already running")]
    AlreadyRunning,
    #[error("invalid length: {0} pulses")]
    InvalidLength(f64),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("MIDI backend error: {0}")]
    Midi(String),
}

impl MetroError {
    /// True for the cancellation signal, which is not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, MetroError::Cancelled { .. })
    }
}
