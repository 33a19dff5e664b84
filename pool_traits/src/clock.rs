use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

/// Clock abstraction shared by every actor.
///
/// - now(): monotonic Instant used for timers and state dwell times
/// - wall_now(): local wall-clock time used for daily schedules (reset hour, backwash date)
/// - sleep(): sleeps for the provided duration (implementations may simulate)
pub trait Clock {
    fn now(&self) -> Instant;
    fn wall_now(&self) -> NaiveDateTime;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Default, real-time clock backed by `std::time::Instant` and the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn wall_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset, wall_now() = wall_origin + offset.
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        wall_origin: NaiveDateTime,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        /// Wall time starts at 1981-05-30 00:00:00.
        pub fn new() -> Self {
            let wall_origin = NaiveDate::from_ymd_opt(1981, 5, 30)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default();
            Self::starting_at(wall_origin)
        }

        pub fn starting_at(wall_origin: NaiveDateTime) -> Self {
            Self {
                origin: Instant::now(),
                wall_origin,
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Set the absolute offset relative to origin (useful for tests).
        pub fn set_offset(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = d;
            }
        }

        fn offset(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.offset()
        }

        fn wall_now(&self) -> NaiveDateTime {
            let off = chrono::TimeDelta::from_std(self.offset()).unwrap_or_default();
            self.wall_origin + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn advance_moves_both_clocks() {
            let clock = TestClock::new();
            let t0 = clock.now();
            let w0 = clock.wall_now();
            clock.advance(Duration::from_secs(90));
            assert_eq!(clock.now() - t0, Duration::from_secs(90));
            assert_eq!((clock.wall_now() - w0).num_seconds(), 90);
            assert_eq!(clock.ms_since(t0), 90_000);
        }

        #[test]
        fn sleep_does_not_block() {
            let clock = TestClock::new();
            let t0 = clock.now();
            clock.sleep(Duration::from_secs(3600));
            assert_eq!(clock.ms_since(t0), 3_600_000);
        }
    }
}
