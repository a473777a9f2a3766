//! Time source abstraction.
//!
//! Every component that compares against "now" (token expiry, lockout, rate
//! windows, cache freshness) reads time through [`Clock`] so tests can move
//! time explicitly instead of sleeping.

use crate::Timestamp;
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut guard = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += delta;
    }

    pub fn set(&self, to: Timestamp) {
        let mut guard = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Add a std duration to a timestamp, saturating at the far future.
pub fn add_duration(at: Timestamp, by: Duration) -> Timestamp {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds from `now` until `until`, rounded up; zero if already past.
pub fn seconds_until(now: Timestamp, until: Timestamp) -> u64 {
    let millis = (until - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_shared_state() {
        let clock = ManualClock::starting_now();
        let other = clock.clone();
        let start = clock.now();
        other.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));
    }

    #[test]
    fn test_seconds_until_rounds_up() {
        let now = Utc::now();
        let until = now + chrono::Duration::milliseconds(1_001);
        assert_eq!(seconds_until(now, until), 2);
        assert_eq!(seconds_until(until, now), 0);
        assert_eq!(seconds_until(now, now), 0);
    }

    #[test]
    fn test_add_duration_saturates() {
        let now = Utc::now();
        assert_eq!(
            add_duration(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(
            add_duration(now, Duration::MAX),
            chrono::DateTime::<Utc>::MAX_UTC
        );
    }
}
