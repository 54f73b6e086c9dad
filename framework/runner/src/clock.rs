use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta};
use parking_lot::Mutex;

/// Source of wall-clock time for run timing and report timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        *self.now.lock() += TimeDelta::seconds(secs);
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

/// Whole seconds from `start` to `end`, truncated and never negative.
pub fn elapsed_secs(start: DateTime<Local>, end: DateTime<Local>) -> u64 {
    (end - start).num_seconds().max(0) as u64
}
