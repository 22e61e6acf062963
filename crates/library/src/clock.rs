use std::sync::atomic::{AtomicI64, Ordering};
use time::{Duration, UtcDateTime};

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Manually driven clock with one-second resolution.
///
/// Not `#[cfg(test)]` so that other crates can use it in their tests.
#[derive(Debug)]
pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self { seconds: AtomicI64::new(start.unix_timestamp()) }
    }

    pub fn set(&self, now: UtcDateTime) {
        self.seconds.store(now.unix_timestamp(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.seconds.fetch_add(by.whole_seconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        // Stored values always come from valid `UtcDateTime`s.
        UtcDateTime::from_unix_timestamp(self.seconds.load(Ordering::SeqCst)).unwrap_or(UtcDateTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let start = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
