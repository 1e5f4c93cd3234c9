//! Wall-clock sources.
//!
//! All clock accounting is derived from wall-clock instants stored on the
//! record, so the source of "now" is injected. Production code uses
//! [`WallClock`]; tests drive a [`ManualClock`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of the current wall-clock instant.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward, saturating at the latest representable
    /// instant.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = chrono::TimeDelta::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Time elapsed from `since` to `now`, zero if `since` is unset or in the
/// future.
#[must_use]
pub fn elapsed_between(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    since
        .map(|since| (now - since).to_std().unwrap_or_default())
        .unwrap_or_default()
}
