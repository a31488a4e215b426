//! Diagnostic delta log
//!
//! Timing diagnostics are collected in memory while the scheduler is busy
//! and written out in one go between events. Each record carries the time
//! since the log was created and the time since the previous record.
//!
//! One [`DeltaLog`] belongs to one transport run. [`DeltaLog::flush`] forwards
//! buffered records to `tracing` at debug level under the `metro::delta`
//! target.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Instant;

/// Default number of records kept between flushes
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Seconds since the log was created
    pub elapsed: f64,
    /// Seconds since the previous record
    pub delta: f64,
    pub message: String,
}

#[derive(Debug)]
pub struct DeltaLog {
    base: Instant,
    last: Cell<f64>,
    records: RefCell<VecDeque<LogRecord>>,
    capacity: usize,
    dropped: Cell<u64>,
}

impl DeltaLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            base: Instant::now(),
            last: Cell::new(0.0),
            records: RefCell::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
            dropped: Cell::new(0),
        }
    }

    /// Buffer a message. When full, the oldest record is dropped and counted.
    pub fn log(&self, message: impl Into<String>) {
        let elapsed = self.base.elapsed().as_secs_f64();
        let delta = elapsed - self.last.replace(elapsed);
        let mut records = self.records.borrow_mut();
        if records.len() >= self.capacity {
            records.pop_front();
            self.dropped.set(self.dropped.get() + 1);
        }
        records.push_back(LogRecord {
            elapsed,
            delta,
            message: message.into(),
        });
    }

    /// Take buffered records without emitting them
    pub fn drain(&self) -> Vec<LogRecord> {
        self.records.borrow_mut().drain(..).collect()
    }

    /// Emit buffered records through `tracing`. Returns how many were written.
    pub fn flush(&self) -> usize {
        let records = self.drain();
        let dropped = self.dropped.replace(0);
        if dropped > 0 {
            tracing::warn!(target: "metro::delta", dropped, "diagnostic log overflowed");
        }
        for record in &records {
            tracing::debug!(
                target: "metro::delta",
                elapsed = record.elapsed,
                delta = record.delta,
                "{}",
                record.message
            );
        }
        records.len()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Records lost to overflow since the last flush
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

impl Default for DeltaLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
