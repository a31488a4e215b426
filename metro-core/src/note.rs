//! Note names
//!
//! MIDI note 60 = Middle C (C4 in scientific pitch notation).

/// Convert a pitch class (0 = C) and octave to a MIDI note number.
/// `midi_note = (octave + 1) * 12 + pitch_class`, clamped to 0-127.
pub fn note_to_midi(pitch_class: u8, octave: i8) -> u8 {
    let midi_note = (octave as i16 + 1) * 12 + pitch_class as i16;
    midi_note.clamp(0, 127) as u8
}

const NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Name of a MIDI note using flats, e.g. `note_name(32) == "Ab1"`
pub fn note_name(note: u8) -> String {
    let octave = note as i16 / 12 - 1;
    format!("{}{}", NAMES[(note % 12) as usize], octave)
}

/// Parse names like `C4`, `Ab1`, `F#3`, `Db-1`. Returns `None` for anything
/// malformed or outside 0-127.
pub fn parse_note(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i16 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave) = match rest.as_bytes().first() {
        Some(b'#') => (1, &rest[1..]),
        Some(b'b') => (-1, &rest[1..]),
        _ => (0, rest),
    };
    let octave: i16 = octave.parse().ok()?;
    let midi = (octave + 1) * 12 + base + accidental;
    (0..=127).contains(&midi).then_some(midi as u8)
}

// Named notes used by the drum maps and demo voices
pub const DB1: u8 = 25;
pub const D1: u8 = 26;
pub const EB1: u8 = 27;
pub const AB1: u8 = 32;
pub const C2: u8 = 36;
pub const C3: u8 = 48;
pub const C4: u8 = 60;
pub const A4: u8 = 69;
