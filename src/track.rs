//! Tracks
//!
//! A [`Track`] is the handle a routine uses to talk to its transport. It
//! holds no state of its own: position, channel, sounding notes and the
//! outstanding deadline live in a slot owned by the transport, keyed by the
//! track id. Once the track is cancelled every call on the handle returns
//! [`MetroError::Cancelled`] (reads fall back to defaults).

use crate::error::{MetroError, Result, TrackId};
use crate::scheduler::{Deadline, DeadlineGuard, Wake};
use crate::sleep::hybrid_sleep;
use crate::transport::Shared;
use crate::voice::Voice;
use metro_core::tempo::{DEFAULT_BEATS_PER_BAR, DEFAULT_PULSES_PER_BEAT};
use metro_core::{Length, MidiMessage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::rc::{Rc, Weak};
use tokio::task::AbortHandle;

/// Seed every new track starts its random stream with
pub const DEFAULT_SEED: u64 = 1;
/// Fraction of a played length during which notes sound
pub const DEFAULT_DECAY: f64 = 0.5;

/// Per-track state, owned by the transport registry.
pub(crate) struct TrackSlot {
    pub(crate) name: String,
    pub(crate) channel: u8,
    pub(crate) position: f64,
    pub(crate) decay: f64,
    /// Sounding (channel, note) pairs, in the order they were started
    pub(crate) active: Vec<(u8, u8)>,
    pub(crate) rng: StdRng,
    pub(crate) deadline: Option<Deadline>,
    pub(crate) task: Option<AbortHandle>,
}

impl TrackSlot {
    pub(crate) fn new(name: String, channel: u8, position: f64) -> Self {
        Self {
            name,
            channel: channel & 0x0F,
            position,
            decay: DEFAULT_DECAY,
            active: Vec::new(),
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            deadline: None,
            task: None,
        }
    }

    /// Forget every sounding note, returning the note-offs to send.
    pub(crate) fn release_all(&mut self) -> Vec<MidiMessage> {
        self.active
            .drain(..)
            .map(|(channel, note)| MidiMessage::note_off(channel, note))
            .collect()
    }
}

/// One or more notes, as accepted by [`Track::play`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notes(Vec<u8>);

impl Notes {
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<u8> for Notes {
    fn from(note: u8) -> Self {
        Notes(vec![note])
    }
}

impl From<i32> for Notes {
    fn from(note: i32) -> Self {
        Notes(vec![note.clamp(0, 127) as u8])
    }
}

impl From<(u8, u8)> for Notes {
    fn from((a, b): (u8, u8)) -> Self {
        Notes(vec![a, b])
    }
}

impl<const N: usize> From<[u8; N]> for Notes {
    fn from(notes: [u8; N]) -> Self {
        Notes(notes.to_vec())
    }
}

impl From<&[u8]> for Notes {
    fn from(notes: &[u8]) -> Self {
        Notes(notes.to_vec())
    }
}

impl From<Vec<u8>> for Notes {
    fn from(notes: Vec<u8>) -> Self {
        Notes(notes)
    }
}

/// MIDI data byte for velocities and controller values. Integers are taken
/// as-is (clamped to 0..=127), floats as a fraction of 127.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Velocity(pub u8);

impl From<u8> for Velocity {
    fn from(value: u8) -> Self {
        Velocity(value.min(127))
    }
}

impl From<i32> for Velocity {
    fn from(value: i32) -> Self {
        Velocity(value.clamp(0, 127) as u8)
    }
}

impl From<f64> for Velocity {
    fn from(value: f64) -> Self {
        Velocity((value * 127.0).clamp(0.0, 127.0) as u8)
    }
}

impl From<f32> for Velocity {
    fn from(value: f32) -> Self {
        Velocity::from(value as f64)
    }
}

#[derive(Clone)]
pub struct Track {
    id: TrackId,
    transport: Weak<Shared>,
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

impl Track {
    pub(crate) fn new(id: TrackId, transport: Weak<Shared>) -> Self {
        Self { id, transport }
    }

    fn shared(&self) -> Result<Rc<Shared>> {
        self.transport
            .upgrade()
            .ok_or(MetroError::Cancelled { track: self.id })
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut TrackSlot) -> R) -> Result<R> {
        self.shared()?.with_slot(self.id, f)
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> String {
        self.with_slot(|slot| slot.name.clone()).unwrap_or_default()
    }

    /// Current position in pulses
    pub fn position(&self) -> f64 {
        self.with_slot(|slot| slot.position).unwrap_or_default()
    }

    pub fn channel(&self) -> u8 {
        self.with_slot(|slot| slot.channel).unwrap_or_default()
    }

    pub fn set_channel(&self, channel: u8) -> Result<()> {
        self.with_slot(|slot| slot.channel = channel & 0x0F)
    }

    pub fn decay(&self) -> f64 {
        self.with_slot(|slot| slot.decay).unwrap_or(DEFAULT_DECAY)
    }

    pub fn set_decay(&self, decay: f64) -> Result<()> {
        self.with_slot(|slot| slot.decay = decay.clamp(0.0, 1.0))
    }

    /// True while the track is still registered with its transport
    pub fn is_alive(&self) -> bool {
        self.with_slot(|_| ()).is_ok()
    }

    /// True while a `wait` or `play` is outstanding
    pub fn is_waiting(&self) -> bool {
        self.with_slot(|slot| slot.deadline.is_some()).unwrap_or(false)
    }

    pub fn bpm(&self) -> f64 {
        self.shared().map(|shared| shared.tempo().bpm()).unwrap_or_default()
    }

    /// Change the tempo of the whole transport
    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.shared()?.set_bpm(bpm)
    }

    pub fn pulses_per_beat(&self) -> u32 {
        self.shared()
            .map(|shared| shared.tempo().pulses_per_beat())
            .unwrap_or(DEFAULT_PULSES_PER_BEAT)
    }

    pub fn pulses_per_bar(&self) -> u32 {
        self.shared()
            .map(|shared| shared.tempo().pulses_per_bar())
            .unwrap_or(DEFAULT_PULSES_PER_BEAT * DEFAULT_BEATS_PER_BAR)
    }

    /// Pulses in an n-th note: `th(4.0)` is a quarter note
    pub fn th(&self, n: f64) -> f64 {
        self.pulses_per_bar() as f64 / n
    }

    /// Pulses in `n` bars
    pub fn bar(&self, n: f64) -> f64 {
        self.pulses_per_bar() as f64 * n
    }

    /// Round the position to the nearest whole pulse. Keeps tracks that do
    /// fractional arithmetic aligned with the clock.
    pub fn sync(&self) -> Result<f64> {
        self.with_slot(|slot| {
            slot.position = slot.position.round();
            slot.position
        })
    }

    /// Run `f` on this track's random stream. Streams are seeded the same way
    /// for every track, so a routine replays identically each time.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> Result<R> {
        self.with_slot(|slot| f(&mut slot.rng))
    }

    pub fn reseed(&self, seed: u64) -> Result<()> {
        self.with_slot(|slot| slot.rng = StdRng::seed_from_u64(seed))
    }

    /// Add a line to the transport's diagnostic log
    pub fn log(&self, message: impl fmt::Display) {
        if let Ok(shared) = self.shared() {
            let name = self.name();
            shared.log().log(format!("{name}: {message}"));
        }
    }

    /// Suspend until the track position has advanced by `pulses`. Returns
    /// the new position.
    ///
    /// Waits shorter than the spin threshold are slept right away. Longer
    /// waits count down on clock pulses and finish with a short sleep for the
    /// fractional remainder, at the tempo current when the countdown ran out.
    pub async fn wait(&self, pulses: f64) -> Result<f64> {
        if !pulses.is_finite() || pulses < 0.0 {
            return Err(MetroError::InvalidLength(pulses));
        }
        let shared = self.shared()?;
        let threshold = shared.settings().spin_threshold;
        let resolution = shared.settings().sleep_resolution;
        let tempo = shared.tempo();
        let deadline = shared.next_deadline_id();

        let wake = shared.with_slot(self.id, |slot| {
            if slot.deadline.is_some() {
                return Err(MetroError::AlreadyWaiting {
                    track: slot.name.clone(),
                });
            }
            if pulses == 0.0 {
                return Ok(Wake::Now(slot.position));
            }
            if pulses <= threshold {
                slot.deadline = Some(Deadline::immediate(deadline, slot.position, pulses));
                Ok(Wake::Sleep(tempo.duration_of(pulses)))
            } else {
                let (record, rx) = Deadline::counted(deadline, slot.position, pulses);
                slot.deadline = Some(record);
                Ok(Wake::Tick(rx))
            }
        })??;
        drop(shared);

        let guard = DeadlineGuard::new(self.transport.clone(), self.id, deadline);
        let resolved = match wake {
            Wake::Now(position) => return Ok(position),
            Wake::Sleep(duration) => {
                hybrid_sleep(duration, resolution).await;
                self.shared()?.resolve_deadline(self.id, deadline)
            }
            Wake::Tick(rx) => rx.await.ok(),
        };
        drop(guard);
        resolved.ok_or(MetroError::Cancelled { track: self.id })
    }

    /// [`Track::wait`] for a musical length
    pub async fn wait_len(&self, length: Length) -> Result<f64> {
        let shared = self.shared()?;
        let pulses = length.to_pulses(&shared.tempo());
        drop(shared);
        self.wait(pulses).await
    }

    /// Sound `notes` for `decay * pulses`, then stay silent for the rest of
    /// `pulses`. Note-offs go out even when the first wait fails.
    pub async fn play(
        &self,
        notes: impl Into<Notes>,
        pulses: f64,
        volume: impl Into<Velocity>,
        decay: f64,
    ) -> Result<f64> {
        if !pulses.is_finite() || pulses < 0.0 {
            return Err(MetroError::InvalidLength(pulses));
        }
        let notes = notes.into();
        let velocity = volume.into();
        let held = pulses * decay.clamp(0.0, 1.0);
        let channel = self.channel();

        for note in notes.iter() {
            self.on_ch(channel, note, velocity)?;
        }
        let sounding = self.wait(held).await;
        for note in notes.iter() {
            // The slot is gone after a cancel; its note-offs were already sent.
            let _ = self.off_ch(channel, note);
        }
        sounding?;
        self.wait(pulses - held).await
    }

    /// [`Track::play`] for a musical length, with the track's decay
    pub async fn play_len(
        &self,
        notes: impl Into<Notes>,
        length: Length,
        volume: impl Into<Velocity>,
    ) -> Result<f64> {
        let pulses = length.to_pulses(&self.shared()?.tempo());
        self.play(notes, pulses, volume, self.decay()).await
    }

    /// Note-on on the track's channel
    pub fn on(&self, note: u8, volume: impl Into<Velocity>) -> Result<()> {
        self.on_ch(self.channel(), note, volume)
    }

    pub fn on_ch(&self, channel: u8, note: u8, volume: impl Into<Velocity>) -> Result<()> {
        let shared = self.shared()?;
        let message = MidiMessage::note_on(channel, note, volume.into().0);
        shared.with_slot(self.id, |slot| {
            slot.active.push((channel & 0x0F, note & 0x7F));
        })?;
        shared.send(message);
        Ok(())
    }

    /// Note-off on the track's channel. Only notes this track started are
    /// released.
    pub fn off(&self, note: u8) -> Result<()> {
        self.off_ch(self.channel(), note)
    }

    pub fn off_ch(&self, channel: u8, note: u8) -> Result<()> {
        let shared = self.shared()?;
        let key = (channel & 0x0F, note & 0x7F);
        let sounding = shared.with_slot(self.id, |slot| {
            match slot.active.iter().position(|active| *active == key) {
                Some(index) => {
                    slot.active.remove(index);
                    true
                }
                None => false,
            }
        })?;
        if sounding {
            shared.send(MidiMessage::note_off(key.0, key.1));
        }
        Ok(())
    }

    /// Release every note this track is sounding
    pub fn off_all(&self) -> Result<()> {
        let shared = self.shared()?;
        let offs = shared.with_slot(self.id, TrackSlot::release_all)?;
        for message in offs {
            shared.send(message);
        }
        Ok(())
    }

    /// Control change on the track's channel
    pub fn cc(&self, controller: u8, value: impl Into<Velocity>) -> Result<()> {
        self.cc_ch(self.channel(), controller, value)
    }

    pub fn cc_ch(&self, channel: u8, controller: u8, value: impl Into<Velocity>) -> Result<()> {
        let shared = self.shared()?;
        shared.send(MidiMessage::control_change(channel, controller, value.into().0));
        Ok(())
    }

    /// Start `voice` on a new child track at this track's position. When
    /// `replace` is given, that track is cancelled first.
    pub fn spawn<V: Voice + 'static>(
        &self,
        voice: V,
        channel: u8,
        name: &str,
        replace: Option<&Track>,
    ) -> Result<Track> {
        if let Some(previous) = replace {
            previous.cancel();
        }
        let shared = self.shared()?;
        let position = shared.with_slot(self.id, |slot| slot.position)?;
        Ok(shared.spawn_track(Rc::new(voice), name.to_string(), channel, position))
    }

    /// Stop this track: resolve nothing, release its notes, abort its routine.
    /// Safe to call more than once.
    pub fn cancel(&self) {
        if let Some(shared) = self.transport.upgrade() {
            shared.cancel_track(self.id);
        }
    }
}
