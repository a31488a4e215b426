//! MIDI ports
//!
//! Output goes through a dedicated writer thread fed by a channel, so
//! sending from the scheduler never blocks on the driver. Input is a midir
//! callback that decodes transport messages and hands them to the engine
//! through a bounded queue.

use crate::engine::InboundEvent;
use crate::error::{MetroError, Result};
use crate::output::OutputSink;
use crossbeam_channel::{unbounded, Receiver, Sender};
use metro_core::midi::ALL_CHANNELS;
use metro_core::{MidiBytes, MidiMessage, TransportEvent};
use midir::{Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const CLIENT_NAME: &str = "metro";

fn backend<E: std::fmt::Display>(err: E) -> MetroError {
    MetroError::Midi(err.to_string())
}

/// First port whose name contains `wanted`
fn find_port<T: MidiIO>(io: &T, wanted: &str) -> Result<(T::Port, String)> {
    io.ports()
        .into_iter()
        .find_map(|port| {
            let name = io.port_name(&port).ok()?;
            name.contains(wanted).then_some((port, name))
        })
        .ok_or_else(|| MetroError::EndpointUnavailable(wanted.to_string()))
}

/// Commands for the output writer thread
#[derive(Debug)]
enum WriterCommand {
    Send(MidiBytes),
    Shutdown,
}

fn write_loop(mut connection: MidiOutputConnection, commands: Receiver<WriterCommand>) {
    while let Ok(command) = commands.recv() {
        match command {
            WriterCommand::Send(bytes) => {
                if let Err(err) = connection.send(&bytes) {
                    tracing::warn!(error = %err, "MIDI send failed");
                }
            }
            WriterCommand::Shutdown => {
                for channel in ALL_CHANNELS {
                    let _ = connection.send(&MidiMessage::all_notes_off(channel).to_bytes());
                }
                break;
            }
        }
    }
    connection.close();
}

/// Output port handle. Dropping it silences every channel and closes the port.
pub struct MidiOutputHandle {
    commands: Sender<WriterCommand>,
    port_name: String,
    thread: Option<JoinHandle<()>>,
}

impl MidiOutputHandle {
    /// Connect to the first output port whose name contains `port`
    pub fn open(port: &str) -> Result<Self> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(backend)?;
        let (port_ref, port_name) = find_port(&output, port)?;
        let connection = output
            .connect(&port_ref, "metro-out")
            .map_err(backend)?;

        let (tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name("midi-out".to_string())
            .spawn(move || write_loop(connection, rx))
            .map_err(backend)?;

        tracing::info!(port = %port_name, "MIDI output connected");
        Ok(Self {
            commands: tx,
            port_name,
            thread: Some(thread),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl OutputSink for MidiOutputHandle {
    fn send(&self, message: MidiMessage) {
        let _ = self.commands.send(WriterCommand::Send(message.to_bytes()));
    }
}

impl Drop for MidiOutputHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(WriterCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Input port handle. The connection stays open while the handle lives.
pub struct MidiInputHandle {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInputHandle {
    /// Connect to the first input port whose name contains `port` and
    /// forward transport messages to `events`. Events that do not fit in the
    /// queue are dropped and counted in `overflow`.
    pub fn open(
        port: &str,
        events: mpsc::Sender<InboundEvent>,
        overflow: Arc<AtomicU64>,
    ) -> Result<Self> {
        let mut input = MidiInput::new(CLIENT_NAME).map_err(backend)?;
        input.ignore(Ignore::SysexAndActiveSense);
        let (port_ref, port_name) = find_port(&input, port)?;

        let connection = input
            .connect(
                &port_ref,
                "metro-in",
                move |_stamp, bytes, _| {
                    let received = Instant::now();
                    match TransportEvent::parse(bytes) {
                        Ok(Some(event)) => {
                            if events.try_send(InboundEvent { event, received }).is_err() {
                                overflow.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => tracing::trace!(error = %err, "malformed input ignored"),
                    }
                },
                (),
            )
            .map_err(backend)?;

        tracing::info!(port = %port_name, "MIDI input connected");
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Port names visible to this client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

fn names<T: MidiIO>(io: &T) -> Vec<String> {
    io.ports()
        .iter()
        .filter_map(|port| io.port_name(port).ok())
        .collect()
}

/// List MIDI ports. Creating a client can fail transiently on some
/// platforms, so this retries up to 3 times with a small delay.
pub fn list_ports() -> Result<PortList> {
    let mut last_err = None;
    for attempt in 0..3 {
        if attempt > 0 {
            thread::sleep(Duration::from_millis(100));
        }
        let clients = MidiInput::new(CLIENT_NAME)
            .and_then(|input| MidiOutput::new(CLIENT_NAME).map(|output| (input, output)));
        match clients {
            Ok((input, output)) => {
                return Ok(PortList {
                    inputs: names(&input),
                    outputs: names(&output),
                })
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(MetroError::Midi(format!(
        "MIDI initialization failed after 3 attempts: {:?}",
        last_err
    )))
}
