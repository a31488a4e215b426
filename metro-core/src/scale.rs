/// A scale as semitone offsets within one octave. Indexing past the end wraps
/// into the next octave; negative indices walk down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    intervals: &'static [u8],
}

pub const IONIAN: Scale = Scale::new(&[0, 2, 4, 5, 7, 9, 11]);
pub const DORIAN: Scale = Scale::new(&[0, 2, 3, 5, 7, 9, 10]);
pub const AEOLIAN: Scale = Scale::new(&[0, 2, 3, 5, 7, 8, 10]);
pub const MAJOR: Scale = IONIAN;
pub const MINOR: Scale = AEOLIAN;

impl Scale {
    pub const fn new(intervals: &'static [u8]) -> Self {
        Self { intervals }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Semitone offset of scale degree `index` (0-based).
    ///
    /// Panics on an empty scale.
    pub fn degree(&self, index: i32) -> i32 {
        let len = self.intervals.len() as i32;
        let octave = index.div_euclid(len);
        let offset = index.rem_euclid(len) as usize;
        self.intervals[offset] as i32 + 12 * octave
    }

    /// `root + degree(index)` clamped into the MIDI note range
    pub fn note(&self, root: u8, index: i32) -> u8 {
        (root as i32 + self.degree(index)).clamp(0, 127) as u8
    }
}
