//! Transport
//!
//! The [`Transport`] owns the pulse clock, the output sink and every track.
//! It is advanced by exactly one consumer (the engine loop or a test) through
//! [`Transport::tick`], and reacts to start/stop/continue and song-position
//! commands.
//!
//! All methods must be called from inside a `tokio::task::LocalSet`: tracks,
//! their routines and deadline triggers are `spawn_local` tasks on the same
//! thread.

use crate::error::{MetroError, Result, TrackId};
use crate::log::{DeltaLog, DEFAULT_CAPACITY};
use crate::output::OutputSink;
use crate::scheduler::{trigger_deadline, DeadlineId};
use crate::sleep::{hybrid_sleep, DEFAULT_RESOLUTION};
use crate::track::{Track, TrackSlot};
use crate::voice::Voice;
use metro_core::midi::{song_position_pulses, ALL_CHANNELS};
use metro_core::{Clock, MidiMessage, Tempo, TickRecord, DEFAULT_SPIN_THRESHOLD};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Name of the track the transport starts the root voice on
pub const ROOT_TRACK: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Running,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub tempo: Tempo,
    /// Spin window of every hybrid sleep
    pub sleep_resolution: Duration,
    /// Waits shorter than this many pulses skip the countdown
    pub spin_threshold: f64,
    /// Gap between song-position and start, and between stop and the
    /// all-notes-off sweep
    pub marker_delay: Duration,
    pub log_capacity: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            sleep_resolution: DEFAULT_RESOLUTION,
            spin_threshold: DEFAULT_SPIN_THRESHOLD,
            marker_delay: Duration::from_millis(1),
            log_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Snapshot of one registered track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub id: TrackId,
    pub name: String,
    pub channel: u8,
    pub position: f64,
    pub waiting: bool,
    pub sounding: usize,
}

pub(crate) struct Shared {
    clock: RefCell<Clock>,
    out: Box<dyn OutputSink>,
    tracks: RefCell<BTreeMap<TrackId, TrackSlot>>,
    state: Cell<TransportState>,
    settings: TransportSettings,
    log: DeltaLog,
    voice: Rc<dyn Voice>,
    next_track: Cell<u64>,
    next_deadline: Cell<u64>,
}

impl Shared {
    pub(crate) fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub(crate) fn log(&self) -> &DeltaLog {
        &self.log
    }

    pub(crate) fn tempo(&self) -> Tempo {
        *self.clock.borrow().tempo()
    }

    pub(crate) fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.clock.borrow_mut().tempo_mut().set_bpm(bpm)?;
        self.log.log(format!("bpm {bpm}"));
        tracing::info!(bpm, "tempo changed");
        Ok(())
    }

    pub(crate) fn send(&self, message: MidiMessage) {
        self.out.send(message);
    }

    pub(crate) fn next_deadline_id(&self) -> DeadlineId {
        let id = self.next_deadline.get();
        self.next_deadline.set(id + 1);
        DeadlineId(id)
    }

    pub(crate) fn with_slot<R>(
        &self,
        id: TrackId,
        f: impl FnOnce(&mut TrackSlot) -> R,
    ) -> Result<R> {
        let mut tracks = self.tracks.borrow_mut();
        tracks
            .get_mut(&id)
            .map(f)
            .ok_or(MetroError::Cancelled { track: id })
    }

    /// Register a track at `position` and start `voice` on it.
    pub(crate) fn spawn_track(
        self: &Rc<Self>,
        voice: Rc<dyn Voice>,
        name: String,
        channel: u8,
        position: f64,
    ) -> Track {
        let id = TrackId(self.next_track.get());
        self.next_track.set(id.0 + 1);
        self.tracks
            .borrow_mut()
            .insert(id, TrackSlot::new(name.clone(), channel, position));

        let track = Track::new(id, Rc::downgrade(self));
        self.log.log(format!("{name} start"));
        tracing::debug!(track = %id, %name, channel, position, "track started");

        let task = tokio::task::spawn_local(voice.run(track.clone()));
        match self.tracks.borrow_mut().get_mut(&id) {
            Some(slot) => slot.task = Some(task.abort_handle()),
            None => task.abort(),
        }
        tokio::task::spawn_local(supervise(Rc::downgrade(self), id, name, task));
        track
    }

    /// Remove a track and everything it owns. Returns false if it was
    /// already gone.
    pub(crate) fn cancel_track(&self, id: TrackId) -> bool {
        let slot = self.tracks.borrow_mut().remove(&id);
        let Some(mut slot) = slot else {
            return false;
        };
        if let Some(mut deadline) = slot.deadline.take() {
            deadline.cancel();
        }
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        for message in slot.release_all() {
            self.send(message);
        }
        true
    }

    fn cancel_all(&self) -> usize {
        let ids: Vec<TrackId> = self.tracks.borrow().keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel_track(*id)).count()
    }

    /// Complete a deadline, provided it is still the outstanding one of a
    /// live track. Returns the new track position.
    pub(crate) fn resolve_deadline(&self, track: TrackId, deadline: DeadlineId) -> Option<f64> {
        let mut tracks = self.tracks.borrow_mut();
        let slot = tracks.get_mut(&track)?;
        let record = slot.deadline.as_mut().filter(|record| record.id == deadline)?;
        match record.resolve() {
            Ok(target) => {
                slot.position = target;
                slot.deadline = None;
                Some(target)
            }
            Err(err) => {
                tracing::error!(track = %track, error = %err, "deadline not resolvable");
                None
            }
        }
    }

    /// Drop a deadline whose waiter went away
    pub(crate) fn abandon_deadline(&self, track: TrackId, deadline: DeadlineId) {
        let Ok(mut tracks) = self.tracks.try_borrow_mut() else {
            return;
        };
        if let Some(slot) = tracks.get_mut(&track) {
            if slot.deadline.as_ref().is_some_and(|record| record.id == deadline) {
                if let Some(mut record) = slot.deadline.take() {
                    record.cancel();
                }
            }
        }
    }

    /// One clock pulse for every registered track
    fn fan_out(self: &Rc<Self>) {
        let threshold = self.settings.spin_threshold;
        let ids: Vec<TrackId> = self.tracks.borrow().keys().copied().collect();
        for id in ids {
            let crossed = {
                let mut tracks = self.tracks.borrow_mut();
                tracks
                    .get_mut(&id)
                    .and_then(|slot| slot.deadline.as_mut())
                    .and_then(|record| {
                        record
                            .countdown
                            .tick(threshold)
                            .map(|rest| (record.id, rest))
                    })
            };
            if let Some((deadline, rest)) = crossed {
                self.arm_trigger(id, deadline, rest);
            }
        }
    }

    fn arm_trigger(self: &Rc<Self>, track: TrackId, deadline: DeadlineId, rest: f64) {
        let wait = self.tempo().duration_of(rest);
        let trigger = tokio::task::spawn_local(trigger_deadline(
            Rc::downgrade(self),
            track,
            deadline,
            wait,
            self.settings.sleep_resolution,
        ));
        let mut tracks = self.tracks.borrow_mut();
        match tracks
            .get_mut(&track)
            .and_then(|slot| slot.deadline.as_mut())
            .filter(|record| record.id == deadline)
        {
            Some(record) => record.arm(trigger.abort_handle()),
            None => trigger.abort(),
        }
    }
}

/// Wait for a routine to end, report how it ended and retire its track.
async fn supervise(
    transport: Weak<Shared>,
    id: TrackId,
    name: String,
    task: JoinHandle<anyhow::Result<()>>,
) {
    let outcome = task.await;
    let Some(shared) = transport.upgrade() else {
        return;
    };
    let position = shared.with_slot(id, |slot| slot.position).ok();

    match outcome {
        Ok(Ok(())) => {
            shared.log.log(format!("{name} done"));
            tracing::debug!(track = %id, %name, "routine finished");
        }
        Ok(Err(err))
            if err
                .downcast_ref::<MetroError>()
                .is_some_and(MetroError::is_cancellation) =>
        {
            shared.log.log(format!("{name} stop"));
            tracing::debug!(track = %id, %name, "routine cancelled");
        }
        Ok(Err(err)) => {
            let failure = MetroError::RoutineFailure {
                track: name.clone(),
                message: format!("{err:#}"),
            };
            shared.log.log(format!("{name} exception"));
            tracing::error!(track = %id, ?position, "{failure}");
        }
        Err(join) if join.is_cancelled() => {
            shared.log.log(format!("{name} stop"));
            tracing::debug!(track = %id, %name, "routine cancelled");
        }
        Err(join) => {
            let failure = MetroError::RoutineFailure {
                track: name.clone(),
                message: join.to_string(),
            };
            shared.log.log(format!("{name} panic"));
            tracing::error!(track = %id, ?position, "{failure}");
        }
    }
    shared.cancel_track(id);
}

/// Pulse-driven transport. Cloning gives another handle to the same one.
#[derive(Clone)]
pub struct Transport {
    shared: Rc<Shared>,
}

impl Transport {
    /// A stopped transport that starts `voice` on its root track
    pub fn new<V, S>(voice: V, out: S, settings: TransportSettings) -> Self
    where
        V: Voice + 'static,
        S: OutputSink + 'static,
    {
        let log = DeltaLog::new(settings.log_capacity);
        Self {
            shared: Rc::new(Shared {
                clock: RefCell::new(Clock::new(settings.tempo)),
                out: Box::new(out),
                tracks: RefCell::new(BTreeMap::new()),
                state: Cell::new(TransportState::Stopped),
                settings,
                log,
                voice: Rc::new(voice),
                next_track: Cell::new(1),
                next_deadline: Cell::new(1),
            }),
        }
    }

    pub fn state(&self) -> TransportState {
        self.shared.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Clock position in whole pulses
    pub fn position(&self) -> u64 {
        self.shared.clock.borrow().position()
    }

    pub fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    pub fn bpm(&self) -> f64 {
        self.tempo().bpm()
    }

    /// Takes effect for the next pulse and for deadlines not yet scheduled
    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.shared.set_bpm(bpm)
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.shared.settings
    }

    pub fn log(&self) -> &DeltaLog {
        &self.shared.log
    }

    async fn marker_delay(&self) {
        let settings = &self.shared.settings;
        hybrid_sleep(settings.marker_delay, settings.sleep_resolution).await;
    }

    /// Reset to position 0, announce the start downstream, start the root
    /// voice and emit the first clock pulse.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        if self.is_running() {
            return Err(MetroError::AlreadyRunning);
        }
        shared.state.set(TransportState::Running);
        shared.clock.borrow_mut().reset();

        shared.send(MidiMessage::song_position(0));
        self.marker_delay().await;
        shared.send(MidiMessage::Start);

        shared.spawn_track(shared.voice.clone(), ROOT_TRACK.to_string(), 0, 0.0);
        shared.send(MidiMessage::Clock);
        shared.clock.borrow_mut().start();

        shared.log.log("start");
        tracing::info!(bpm = self.bpm(), "transport started");
        Ok(())
    }

    /// Cancel every track, announce the stop and silence all channels.
    /// Also usable as a shutdown path when not running.
    pub async fn stop(&self) {
        let shared = &self.shared;
        let was_running = shared.state.replace(TransportState::Stopped) == TransportState::Running;
        let cancelled = shared.cancel_all();

        shared.send(MidiMessage::Stop);
        self.marker_delay().await;
        for channel in ALL_CHANNELS {
            shared.send(MidiMessage::all_notes_off(channel));
        }

        shared.log.log(format!("stop, {cancelled} tracks cancelled"));
        shared.log.flush();
        if was_running {
            tracing::info!(position = self.position(), cancelled, "transport stopped");
        }
    }

    /// Resume from the current clock position without resetting it. The
    /// root voice is restarted there if no track survived the stop.
    pub fn resume(&self) -> Result<()> {
        let shared = &self.shared;
        if self.is_running() {
            return Err(MetroError::AlreadyRunning);
        }
        shared.state.set(TransportState::Running);
        let position = {
            let mut clock = shared.clock.borrow_mut();
            let position = clock.position().max(1);
            clock.set_position(position);
            position
        };
        shared.send(MidiMessage::Continue);
        if shared.tracks.borrow().is_empty() {
            shared.spawn_track(shared.voice.clone(), ROOT_TRACK.to_string(), 0, position as f64);
        }
        shared.log.log(format!("continue at {position}"));
        tracing::info!(position, "transport continued");
        Ok(())
    }

    /// Apply a song-position pointer. Returns the new position in pulses.
    pub fn set_song_position(&self, lsb: u8, msb: u8) -> u64 {
        let pulses = song_position_pulses(lsb, msb);
        self.shared.clock.borrow_mut().set_position(pulses);
        self.shared.log.log(format!("song position {pulses}"));
        tracing::debug!(pulses, "song position");
        pulses
    }

    /// Advance by one pulse: clock bookkeeping, a clock message downstream,
    /// then one countdown step for every track.
    pub fn tick(&self, now: Instant) -> Result<TickRecord> {
        if !self.is_running() {
            return Err(MetroError::NotRunning);
        }
        let record = self.shared.clock.borrow_mut().tick(now);
        self.shared.send(MidiMessage::Clock);
        self.shared.fan_out();
        Ok(record)
    }

    /// Start `voice` on a new top-level track at the current clock position
    pub fn spawn<V: Voice + 'static>(&self, voice: V, channel: u8, name: &str) -> Result<Track> {
        if !self.is_running() {
            return Err(MetroError::NotRunning);
        }
        let position = self.position() as f64;
        Ok(self
            .shared
            .spawn_track(Rc::new(voice), name.to_string(), channel, position))
    }

    /// Live tracks in start order
    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.shared
            .tracks
            .borrow()
            .iter()
            .map(|(id, slot)| TrackInfo {
                id: *id,
                name: slot.name.clone(),
                channel: slot.channel,
                position: slot.position,
                waiting: slot.deadline.is_some(),
                sounding: slot.active.len(),
            })
            .collect()
    }

    /// Handle to the first live track called `name`
    pub fn track(&self, name: &str) -> Option<Track> {
        self.shared
            .tracks
            .borrow()
            .iter()
            .find(|(_, slot)| slot.name == name)
            .map(|(id, _)| Track::new(*id, Rc::downgrade(&self.shared)))
    }

    pub fn cancel(&self, id: TrackId) -> bool {
        self.shared.cancel_track(id)
    }

    /// Release every note any track holds, then send all-notes-off on every
    /// channel. Tracks keep running.
    pub fn panic(&self) {
        let offs: Vec<MidiMessage> = self
            .shared
            .tracks
            .borrow_mut()
            .values_mut()
            .flat_map(TrackSlot::release_all)
            .collect();
        for message in offs {
            self.shared.send(message);
        }
        for channel in ALL_CHANNELS {
            self.shared.send(MidiMessage::all_notes_off(channel));
        }
        tracing::warn!("panic: all notes off");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for slot in self.tracks.get_mut().values_mut() {
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingSink;

    async fn idle(_track: Track) -> anyhow::Result<()> {
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_tick_requires_running() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let transport =
                    Transport::new(idle, RecordingSink::new(), TransportSettings::default());
                assert!(matches!(
                    transport.tick(Instant::now()),
                    Err(MetroError::NotRunning)
                ));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_start_sequence() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let sink = RecordingSink::new();
                let transport = Transport::new(idle, sink.clone(), TransportSettings::default());
                transport.start().await.unwrap();

                assert_eq!(
                    sink.messages(),
                    vec![
                        MidiMessage::SongPosition { beats: 0 },
                        MidiMessage::Start,
                        MidiMessage::Clock,
                    ]
                );
                assert_eq!(transport.position(), 1);
                assert!(matches!(transport.start().await, Err(MetroError::AlreadyRunning)));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_song_position_sets_clock() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let transport =
                    Transport::new(idle, RecordingSink::new(), TransportSettings::default());
                assert_eq!(transport.set_song_position(0x00, 0x01), 768);
                assert_eq!(transport.position(), 768);
            })
            .await;
    }
}
