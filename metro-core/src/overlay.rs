//! Cyclic value map over pulse positions
//!
//! An [`Overlay`] assigns values to pulse spans inside a loop of `length`
//! pulses, then answers "what value applies at position p" for any position,
//! wrapping around the loop. Voices use it for accent and velocity shapes
//! that stay locked to the pulse grid regardless of what they play.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay<T> {
    length: u64,
    spans: Vec<(Range<u64>, T)>,
}

impl<T> Overlay<T> {
    /// Empty overlay looping every `length` pulses (at least 1)
    pub fn new(length: u64) -> Self {
        Self {
            length: length.max(1),
            spans: Vec::new(),
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Assign `value` to `span`. Later spans win where they overlap.
    pub fn set(&mut self, span: Range<u64>, value: T) -> &mut Self {
        self.spans.push((span, value));
        self
    }

    /// Value at `position`, wrapped into the loop. Fractional positions
    /// round down to the pulse they fall in.
    pub fn get(&self, position: f64) -> Option<&T> {
        let pulse = (position.floor() as i64).rem_euclid(self.length as i64) as u64;
        self.spans
            .iter()
            .rev()
            .find(|(span, _)| span.contains(&pulse))
            .map(|(_, value)| value)
    }
}

impl<T: Copy> Overlay<T> {
    /// Like [`Overlay::get`] with a fallback for uncovered pulses
    pub fn get_or(&self, position: f64, default: T) -> T {
        self.get(position).copied().unwrap_or(default)
    }
}

impl<T: Clone> Overlay<T> {
    /// Accent shape over 48 pulses (two beats at 24 PPQN): `low` everywhere but a
    /// `high` push on pulses 20..28.
    pub fn accent(low: T, high: T) -> Self {
        let mut overlay = Self::new(48);
        overlay
            .set(0..20, low.clone())
            .set(20..28, high)
            .set(28..48, low);
        overlay
    }
}
