//! Consumer loop
//!
//! The [`Engine`] is the single consumer that drives a [`Transport`]. It
//! drains two bounded queues: transport events from the MIDI input thread and
//! control requests from the REPL thread. With an internal clock it also
//! paces the pulses itself.

use crate::config::ClockSource;
use crate::error::Result;
use crate::sleep::sleep_until;
use crate::transport::{TrackInfo, Transport, TransportState};
use metro_core::{TickRecord, TransportEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// A transport event stamped with the instant it came off the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InboundEvent {
    pub event: TransportEvent,
    pub received: Instant,
}

impl InboundEvent {
    pub fn now(event: TransportEvent) -> Self {
        Self {
            event,
            received: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    Continue,
    /// Query the tempo, or set it
    Tempo(Option<f64>),
    Status,
    Tracks,
    Panic,
    Shutdown,
}

pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: crossbeam_channel::Sender<ControlReply>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: TransportState,
    pub bpm: f64,
    pub position: u64,
    pub tracks: usize,
    pub clock: ClockSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlReply {
    Done(String),
    Tempo(f64),
    Status(StatusReport),
    Tracks(Vec<TrackInfo>),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct Engine {
    transport: Transport,
    source: ClockSource,
    events: mpsc::Receiver<InboundEvent>,
    control: mpsc::Receiver<ControlRequest>,
    overflow: Arc<AtomicU64>,
    reported_overflow: u64,
}

impl Engine {
    pub fn new(
        transport: Transport,
        source: ClockSource,
        events: mpsc::Receiver<InboundEvent>,
        control: mpsc::Receiver<ControlRequest>,
    ) -> Self {
        Self {
            transport,
            source,
            events,
            control,
            overflow: Arc::new(AtomicU64::new(0)),
            reported_overflow: 0,
        }
    }

    /// Share the counter the input thread bumps when the event queue is full
    pub fn with_overflow_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.overflow = counter;
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run until a shutdown request, or until the input side hangs up when
    /// following an external clock.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(clock = %self.source, bpm = self.transport.bpm(), "engine running");
        match self.source {
            ClockSource::Internal => self.run_internal().await,
            ClockSource::External => self.run_external().await,
        }
    }

    async fn run_internal(&mut self) -> Result<()> {
        let resolution = self.transport.settings().sleep_resolution;
        if !self.transport.is_running() {
            self.transport.start().await?;
        }
        // `start` sent the first pulse, so the next one is a pulse away.
        let mut next = self.pulse_after(Instant::now());
        let mut events_open = true;
        let mut control_open = true;
        loop {
            let pulse_at = next.unwrap_or_else(Instant::now);
            tokio::select! {
                biased;
                request = self.control.recv(), if control_open => match request {
                    Some(request) => {
                        let restarts = matches!(
                            request.command,
                            ControlCommand::Start | ControlCommand::Continue
                        );
                        if self.serve(request).await == Flow::Shutdown {
                            return Ok(());
                        }
                        next = self.repace(next, restarts);
                    }
                    None => control_open = false,
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => {
                        let restarts = matches!(
                            event.event,
                            TransportEvent::Start | TransportEvent::Continue
                        );
                        self.handle_event(event).await?;
                        next = self.repace(next, restarts);
                    }
                    None => events_open = false,
                },
                _ = sleep_until(pulse_at, resolution), if next.is_some() => {
                    if self.transport.is_running() {
                        let record = self.transport.tick(Instant::now())?;
                        self.trace_tick(&record);
                    }
                    let now = Instant::now();
                    let due = next.and_then(|at| self.pulse_after(at));
                    // Fell behind; resume pacing from here rather than bursting.
                    next = match due {
                        Some(at) if at < now => Some(now),
                        other => other,
                    };
                },
                else => {
                    tracing::info!("no pulse can be scheduled and nothing is listening");
                    return Ok(());
                }
            }
            self.report_overflow();
            self.transport.log().flush();
        }
    }

    /// One pulse after `from` at the live tempo, if the clock can represent it
    fn pulse_after(&self, from: Instant) -> Option<Instant> {
        from.checked_add(self.transport.tempo().pulse_duration())
    }

    /// Pacing after a command. A start or resume puts the next pulse one full
    /// pulse from now; anything else (a tempo change) may only bring the next
    /// pulse closer.
    fn repace(&self, next: Option<Instant>, restarted: bool) -> Option<Instant> {
        let fresh = self.pulse_after(Instant::now());
        if restarted {
            return fresh;
        }
        match (next, fresh) {
            (Some(at), Some(fresh)) => Some(at.min(fresh)),
            (None, fresh) => fresh,
            (at, None) => at,
        }
    }

    async fn run_external(&mut self) -> Result<()> {
        let mut control_open = true;
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => {
                        tracing::info!("input closed");
                        return Ok(());
                    }
                },
                request = self.control.recv(), if control_open => match request {
                    Some(request) => {
                        if self.serve(request).await == Flow::Shutdown {
                            return Ok(());
                        }
                    }
                    None => control_open = false,
                },
            }
            self.report_overflow();
            self.transport.log().flush();
        }
    }

    /// Apply one transport event
    pub async fn handle_event(&mut self, inbound: InboundEvent) -> Result<()> {
        let running = self.transport.is_running();
        match inbound.event {
            TransportEvent::Clock => {
                if self.source == ClockSource::External && running {
                    let record = self.transport.tick(inbound.received)?;
                    self.trace_tick(&record);
                }
            }
            TransportEvent::Start => {
                if running {
                    self.transport.stop().await;
                }
                self.transport.start().await?;
            }
            TransportEvent::Stop => self.transport.stop().await,
            TransportEvent::Continue => {
                if !running {
                    self.transport.resume()?;
                }
            }
            TransportEvent::SongPosition { lsb, msb } => {
                self.transport.set_song_position(lsb, msb);
            }
        }
        Ok(())
    }

    async fn serve(&mut self, request: ControlRequest) -> Flow {
        let (reply, flow) = self.handle_control(request.command).await;
        // The REPL may have given up waiting.
        let _ = request.reply.send(reply);
        flow
    }

    /// Apply one control command and build its reply
    pub async fn handle_control(&mut self, command: ControlCommand) -> (ControlReply, Flow) {
        let reply = match command {
            ControlCommand::Start => match self.transport.start().await {
                Ok(()) => ControlReply::Done("started".to_string()),
                Err(err) => ControlReply::Error(err.to_string()),
            },
            ControlCommand::Stop => {
                self.transport.stop().await;
                ControlReply::Done("stopped".to_string())
            }
            ControlCommand::Continue => match self.transport.resume() {
                Ok(()) => ControlReply::Done(format!(
                    "continued at pulse {}",
                    self.transport.position()
                )),
                Err(err) => ControlReply::Error(err.to_string()),
            },
            ControlCommand::Tempo(None) => ControlReply::Tempo(self.transport.bpm()),
            ControlCommand::Tempo(Some(bpm)) => match self.transport.set_bpm(bpm) {
                Ok(()) => ControlReply::Tempo(bpm),
                Err(err) => ControlReply::Error(err.to_string()),
            },
            ControlCommand::Status => ControlReply::Status(self.status()),
            ControlCommand::Tracks => ControlReply::Tracks(self.transport.tracks()),
            ControlCommand::Panic => {
                self.transport.panic();
                ControlReply::Done("all notes off".to_string())
            }
            ControlCommand::Shutdown => {
                self.transport.stop().await;
                return (ControlReply::Done("shutting down".to_string()), Flow::Shutdown);
            }
        };
        (reply, Flow::Continue)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.transport.state(),
            bpm: self.transport.bpm(),
            position: self.transport.position(),
            tracks: self.transport.tracks().len(),
            clock: self.source,
        }
    }

    fn trace_tick(&self, record: &TickRecord) {
        if tracing::enabled!(target: "metro::delta", tracing::Level::DEBUG) {
            self.transport.log().log(format!(
                "tick delta={:.6} jitter={:+.2}% pos={}",
                record.delta, record.jitter, record.position
            ));
        }
    }

    fn report_overflow(&mut self) {
        let total = self.overflow.load(Ordering::Relaxed);
        if total > self.reported_overflow {
            tracing::warn!(
                dropped = total - self.reported_overflow,
                "inbound queue full, events dropped"
            );
            self.reported_overflow = total;
        }
    }
}
