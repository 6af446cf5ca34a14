//! Injectable time source
//!
//! Engine logic never reads the wall clock; callers pass `now` in, and the
//! service layer obtains it from a [`Clock`]. Tests drive a [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::types::Timestamp;

/// Source of the current UNIX time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock (UTC)
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for deterministic tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward, returning the new time
    pub fn advance(&self, by: Duration) -> Timestamp {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.now.fetch_add(secs, Ordering::SeqCst).saturating_add(secs)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
