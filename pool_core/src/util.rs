//! Elapsed-time helpers shared by the schedulers.
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(3600);
pub const DAY: Duration = Duration::from_secs(24 * 3600);

/// Wall-clock span from `from` to `to`, zero when `to` is earlier.
#[inline]
pub fn span(from: NaiveDateTime, to: NaiveDateTime) -> Duration {
    (to - from).to_std().unwrap_or_default()
}

/// Shift a wall-clock instant by a std duration.
#[inline]
pub fn add(t: NaiveDateTime, d: Duration) -> NaiveDateTime {
    t + chrono::TimeDelta::from_std(d).unwrap_or_default()
}

/// Same day as `t`, at `hour:00:00`.
pub fn at_hour(t: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    t.date().and_time(time)
}

#[inline]
pub fn constrain<T: PartialOrd>(x: T, min: T, max: T) -> T {
    if x < min {
        min
    } else if x > max {
        max
    } else {
        x
    }
}

/// Round to the nearest whole second.
#[inline]
pub fn round_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs() + u64::from(d.subsec_millis() >= 500))
}

/// `H:MM:SS`, hours unbounded.
pub fn hms(d: Duration) -> String {
    let s = d.as_secs();
    format!("{}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}

/// Countdown accumulating wall-clock time between updates.
///
/// `update` adds the time since the previous update, scaled by `factor`; the
/// first update after `clear` only records the reference instant.
#[derive(Debug, Clone)]
pub struct Timer {
    name: &'static str,
    duration: Duration,
    delay: Duration,
    last: Option<NaiveDateTime>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            duration: Duration::ZERO,
            delay: Duration::ZERO,
            last: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, d: Duration) {
        self.duration = d;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Setting a new delay restarts the countdown.
    pub fn set_delay(&mut self, d: Duration) {
        self.delay = d;
        self.reset();
    }

    /// Change the delay, keeping the count and the reference instant.
    pub fn set_delay_keep(&mut self, d: Duration) {
        self.delay = d;
    }

    pub fn remaining(&self) -> Duration {
        self.delay.saturating_sub(self.duration)
    }

    pub fn is_running(&self) -> bool {
        self.last.is_some()
    }

    /// Forget the reference instant, keeping the accumulated duration.
    pub fn clear(&mut self) {
        self.last = None;
    }

    pub fn reset(&mut self) {
        self.clear();
        self.duration = Duration::ZERO;
    }

    pub fn update(&mut self, now: NaiveDateTime, factor: f64) {
        if let Some(last) = self.last {
            self.duration += span(last, now).mul_f64(constrain(factor, 0.0, 1.0));
            tracing::trace!(
                timer = self.name,
                duration = ?self.duration,
                remaining = ?self.remaining(),
                "timer update"
            );
        }
        self.last = Some(now);
    }

    pub fn elapsed(&self) -> bool {
        self.duration >= self.delay
    }
}

/// Cumulative run time across start/stop pairs.
#[derive(Debug, Clone, Default)]
pub struct RunCounter {
    total: Duration,
    start: Option<NaiveDateTime>,
}

impl RunCounter {
    pub fn init(&mut self, total: Duration) {
        self.total = total;
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn start(&mut self, now: NaiveDateTime) {
        self.start = Some(now);
    }

    /// Add the time since `start` and return the new total.
    pub fn stop(&mut self, now: NaiveDateTime) -> Duration {
        if let Some(start) = self.start.take() {
            self.total += span(start, now);
        }
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1981, 5, 30)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn first_update_only_records_reference() {
        let mut t = Timer::new("t");
        t.set_delay(HOUR);
        t.update(at(0, 0, 0), 1.0);
        assert_eq!(t.duration(), Duration::ZERO);
        t.update(at(0, 30, 0), 1.0);
        assert_eq!(t.duration(), 30 * MINUTE);
        assert_eq!(t.remaining(), 30 * MINUTE);
        assert!(!t.elapsed());
        t.update(at(1, 0, 0), 1.0);
        assert!(t.elapsed());
    }

    #[rstest]
    #[case(1.0, 600)]
    #[case(0.5, 300)]
    #[case(0.0, 0)]
    fn factor_scales_accumulation(#[case] factor: f64, #[case] expected: u64) {
        let mut t = Timer::new("t");
        t.update(at(1, 0, 0), factor);
        t.update(at(1, 10, 0), factor);
        assert_eq!(t.duration(), Duration::from_secs(expected));
    }

    #[test]
    fn clear_keeps_duration_but_drops_gap() {
        let mut t = Timer::new("t");
        t.update(at(1, 0, 0), 1.0);
        t.update(at(1, 10, 0), 1.0);
        t.clear();
        t.update(at(5, 0, 0), 1.0);
        assert_eq!(t.duration(), 10 * MINUTE);
        assert!(t.is_running());
    }

    #[test]
    fn set_delay_restarts_countdown() {
        let mut t = Timer::new("t");
        t.update(at(1, 0, 0), 1.0);
        t.update(at(2, 0, 0), 1.0);
        t.set_delay(30 * MINUTE);
        assert_eq!(t.duration(), Duration::ZERO);
        assert!(!t.is_running());
    }

    #[test]
    fn set_delay_keep_counts_on() {
        let mut t = Timer::new("t");
        t.update(at(1, 0, 0), 1.0);
        t.update(at(2, 0, 0), 1.0);
        t.set_delay_keep(30 * MINUTE);
        t.update(at(2, 10, 0), 1.0);
        assert_eq!(t.duration(), 70 * MINUTE);
        assert!(t.is_running());
        assert!(t.elapsed());
    }

    #[test]
    fn zero_delay_is_elapsed() {
        assert!(Timer::new("t").elapsed());
    }

    #[test]
    fn run_counter_sums_runs() {
        let mut c = RunCounter::default();
        c.init(HOUR);
        assert_eq!(c.stop(at(2, 0, 0)), HOUR);
        c.start(at(1, 0, 0));
        assert_eq!(c.stop(at(1, 30, 0)), 90 * MINUTE);
        c.start(at(3, 0, 0));
        assert_eq!(c.stop(at(3, 15, 0)), 105 * MINUTE);
    }

    #[rstest]
    #[case(Duration::from_millis(1499), 1)]
    #[case(Duration::from_millis(1500), 2)]
    #[case(Duration::ZERO, 0)]
    fn rounds_to_whole_seconds(#[case] d: Duration, #[case] secs: u64) {
        assert_eq!(round_secs(d), Duration::from_secs(secs));
    }

    #[test]
    fn hms_formats_long_spans() {
        assert_eq!(hms(Duration::from_secs(3661)), "1:01:01");
        assert_eq!(hms(DAY + HOUR), "25:00:00");
    }

    #[test]
    fn span_saturates() {
        assert_eq!(span(at(2, 0, 0), at(1, 0, 0)), Duration::ZERO);
        assert_eq!(add(at(1, 0, 0), HOUR), at(2, 0, 0));
    }
}
