//! MIDI wire constants and the few message shapes the scheduler speaks.
//!
//! Output goes through [`MidiMessage`]: note on/off, control change and the
//! system real-time transport commands. Input is reduced to
//! [`TransportEvent`], the five transport op-codes the engine reacts to.
//! Everything else on the wire is ignored.

use crate::error::CoreError;
use std::ops::{Deref, Range};

// Channel voice messages (upper nibble, OR the channel into the lower nibble)
pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_AFTERTOUCH: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHAN_AFTERTOUCH: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

// System messages
pub const SYSEX: u8 = 0xF0;
pub const SONG_POSITION: u8 = 0xF2;
pub const CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

/// Mask that strips the channel nibble from a channel voice status byte.
pub const STRIP_CHANNEL: u8 = 0xF0;

// Controller numbers (use with CONTROL_CHANGE)
pub const MOD_WHEEL: u8 = 1;
pub const PORTAMENTO_TIME: u8 = 5;
pub const EXPRESSION_PEDAL: u8 = 11;
pub const SUSTAIN_PEDAL: u8 = 64;
pub const PORTAMENTO: u8 = 65;
pub const ALL_NOTES_OFF: u8 = 123;

/// Every MIDI channel, 0-indexed.
pub const ALL_CHANNELS: Range<u8> = 0..16;

/// Pulses per song-position unit (one sixteenth note at 24 PPQN).
pub const PULSES_PER_SONG_POSITION: u64 = 6;

/// An outgoing command. Constructors mask channels to 0-15 and data bytes to
/// 0-127 so that any value built here is valid on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    Clock,
    Start,
    Continue,
    Stop,
    /// Song position in sixteenth notes (14-bit).
    SongPosition { beats: u16 },
}

impl MidiMessage {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        MidiMessage::NoteOn {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
        }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        MidiMessage::NoteOff {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: 0,
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        MidiMessage::ControlChange {
            channel: channel & 0x0F,
            controller: controller & 0x7F,
            value: value & 0x7F,
        }
    }

    /// CC 123 on one channel
    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(channel, ALL_NOTES_OFF, 0)
    }

    /// Song position pointer for an absolute pulse position, rounded down to
    /// the nearest sixteenth.
    pub fn song_position(pulses: u64) -> Self {
        let beats = (pulses / PULSES_PER_SONG_POSITION).min(0x3FFF) as u16;
        MidiMessage::SongPosition { beats }
    }

    /// Status byte including the channel nibble where there is one.
    pub fn status(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn { channel, .. } => NOTE_ON | channel,
            MidiMessage::NoteOff { channel, .. } => NOTE_OFF | channel,
            MidiMessage::ControlChange { channel, .. } => CONTROL_CHANGE | channel,
            MidiMessage::Clock => CLOCK,
            MidiMessage::Start => START,
            MidiMessage::Continue => CONTINUE,
            MidiMessage::Stop => STOP,
            MidiMessage::SongPosition { .. } => SONG_POSITION,
        }
    }

    /// Channel of a channel voice message.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Encode to raw wire bytes.
    pub fn to_bytes(&self) -> MidiBytes {
        let status = self.status();
        match *self {
            MidiMessage::NoteOn { note, velocity, .. }
            | MidiMessage::NoteOff { note, velocity, .. } => {
                MidiBytes::three(status, note & 0x7F, velocity & 0x7F)
            }
            MidiMessage::ControlChange {
                controller, value, ..
            } => MidiBytes::three(status, controller & 0x7F, value & 0x7F),
            MidiMessage::SongPosition { beats } => {
                MidiBytes::three(status, (beats & 0x7F) as u8, ((beats >> 7) & 0x7F) as u8)
            }
            MidiMessage::Clock
            | MidiMessage::Start
            | MidiMessage::Continue
            | MidiMessage::Stop => MidiBytes::one(status),
        }
    }
}

/// Up to three encoded bytes without a heap allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiBytes {
    buf: [u8; 3],
    len: usize,
}

impl MidiBytes {
    fn one(status: u8) -> Self {
        Self {
            buf: [status, 0, 0],
            len: 1,
        }
    }

    fn three(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            buf: [status, data1, data2],
            len: 3,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Deref for MidiBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Incoming transport events the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportEvent {
    Clock,
    Start,
    Stop,
    Continue,
    SongPosition { lsb: u8, msb: u8 },
}

impl TransportEvent {
    /// Decode raw bytes. Returns `Ok(None)` for anything that is not one of
    /// the five transport messages (notes, CCs, sysex, active sensing...).
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>, CoreError> {
        let Some(&status) = bytes.first() else {
            return Err(CoreError::Empty);
        };
        let event = match status {
            CLOCK => TransportEvent::Clock,
            START => TransportEvent::Start,
            STOP => TransportEvent::Stop,
            CONTINUE => TransportEvent::Continue,
            SONG_POSITION => {
                if bytes.len() < 3 {
                    return Err(CoreError::Truncated {
                        status,
                        expected: 3,
                        got: bytes.len(),
                    });
                }
                TransportEvent::SongPosition {
                    lsb: bytes[1],
                    msb: bytes[2],
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Absolute pulse position carried by a song-position event.
    pub fn song_position(&self) -> Option<u64> {
        match *self {
            TransportEvent::SongPosition { lsb, msb } => Some(song_position_pulses(lsb, msb)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Clock => "CLOCK",
            TransportEvent::Start => "START",
            TransportEvent::Stop => "STOP",
            TransportEvent::Continue => "CONTINUE",
            TransportEvent::SongPosition { .. } => "SONG_POSITION",
        }
    }
}

/// `((msb << 7) + lsb) * 6`
pub fn song_position_pulses(lsb: u8, msb: u8) -> u64 {
    (((msb as u64) << 7) + lsb as u64) * PULSES_PER_SONG_POSITION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_bytes() {
        let msg = MidiMessage::note_on(2, 60, 100);
        assert_eq!(msg.to_bytes().as_slice(), &[0x92, 60, 100]);
    }

    #[test]
    fn test_constructors_mask_out_of_range_values() {
        let msg = MidiMessage::note_on(17, 200, 255);
        assert_eq!(msg.to_bytes().as_slice(), &[0x91, 200 & 0x7F, 0x7F]);
        assert_eq!(msg.channel(), Some(1));
    }

    #[test]
    fn test_note_off_has_zero_velocity() {
        assert_eq!(MidiMessage::note_off(0, 48).to_bytes().as_slice(), &[0x80, 48, 0]);
    }

    #[test]
    fn test_all_notes_off() {
        assert_eq!(
            MidiMessage::all_notes_off(15).to_bytes().as_slice(),
            &[0xBF, ALL_NOTES_OFF, 0]
        );
    }

    #[test]
    fn test_realtime_messages_are_single_byte() {
        assert_eq!(MidiMessage::Clock.to_bytes().as_slice(), &[CLOCK]);
        assert_eq!(MidiMessage::Start.to_bytes().as_slice(), &[START]);
        assert_eq!(MidiMessage::Stop.to_bytes().as_slice(), &[STOP]);
        assert_eq!(MidiMessage::Continue.to_bytes().as_slice(), &[CONTINUE]);
    }

    #[test]
    fn test_song_position_encoding() {
        assert_eq!(
            MidiMessage::song_position(0).to_bytes().as_slice(),
            &[SONG_POSITION, 0, 0]
        );
        // 768 pulses = 128 sixteenths = lsb 0, msb 1
        assert_eq!(
            MidiMessage::song_position(768).to_bytes().as_slice(),
            &[SONG_POSITION, 0, 1]
        );
    }

    #[test]
    fn test_parse_transport_events() {
        assert_eq!(TransportEvent::parse(&[CLOCK]), Ok(Some(TransportEvent::Clock)));
        assert_eq!(TransportEvent::parse(&[START]), Ok(Some(TransportEvent::Start)));
        assert_eq!(TransportEvent::parse(&[STOP]), Ok(Some(TransportEvent::Stop)));
        assert_eq!(
            TransportEvent::parse(&[CONTINUE]),
            Ok(Some(TransportEvent::Continue))
        );
        assert_eq!(TransportEvent::parse(&[NOTE_ON, 60, 100]), Ok(None));
    }

    #[test]
    fn test_parse_rejects_truncated_song_position() {
        assert!(matches!(
            TransportEvent::parse(&[SONG_POSITION, 3]),
            Err(CoreError::Truncated { expected: 3, got: 2, .. })
        ));
        assert_eq!(TransportEvent::parse(&[]), Err(CoreError::Empty));
    }

    #[test]
    fn test_song_position_formula() {
        assert_eq!(song_position_pulses(0, 1), 768);
        assert_eq!(song_position_pulses(1, 0), 6);
        assert_eq!(song_position_pulses(0x7F, 0x7F), 16383 * 6);

        let event = TransportEvent::parse(&[SONG_POSITION, 0, 1]).unwrap().unwrap();
        assert_eq!(event.song_position(), Some(768));
        assert_eq!(TransportEvent::Clock.song_position(), None);
    }
}
