//! Output sinks
//!
//! The scheduler hands every outgoing command to an [`OutputSink`]. Sends are
//! fire-and-forget: a sink must not block and must keep commands in order.

use metro_core::MidiMessage;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// Destination for outgoing MIDI commands
pub trait OutputSink {
    fn send(&self, message: MidiMessage);
}

impl<S: OutputSink + ?Sized> OutputSink for Rc<S> {
    fn send(&self, message: MidiMessage) {
        (**self).send(message)
    }
}

/// Keeps every command with the instant it was sent. Clones share the same
/// buffer, so a test can keep one clone and hand the other to a transport.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Rc<RefCell<Vec<(Instant, MidiMessage)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands in send order
    pub fn messages(&self) -> Vec<MidiMessage> {
        self.sent.borrow().iter().map(|(_, message)| *message).collect()
    }

    /// Commands in send order with their send instants
    pub fn timed(&self) -> Vec<(Instant, MidiMessage)> {
        self.sent.borrow().clone()
    }

    /// Everything except clock pulses
    pub fn without_clock(&self) -> Vec<MidiMessage> {
        self.messages()
            .into_iter()
            .filter(|message| *message != MidiMessage::Clock)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl OutputSink for RecordingSink {
    fn send(&self, message: MidiMessage) {
        self.sent.borrow_mut().push((Instant::now(), message));
    }
}

/// Dry-run sink: traces each command and drops it
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceSink;

impl OutputSink for TraceSink {
    fn send(&self, message: MidiMessage) {
        if message != MidiMessage::Clock {
            tracing::trace!(?message, bytes = ?message.to_bytes().as_slice(), "midi out");
        }
    }
}
