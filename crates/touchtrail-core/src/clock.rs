//! Wall-clock source for capture timestamps.
//!
//! All timestamps in touchtrail are milliseconds since the Unix epoch, which
//! is what the persisted log and attribution cookie carry.

use std::cell::Cell;
use std::rc::Rc;

/// Source of the current time in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can keep a handle and advance
/// the time seen by a tracker it has handed a clone to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.set(now_ms);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now.set(self.now.get().saturating_add(delta_ms));
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance_ms(minutes.saturating_mul(60_000));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}
