//! Periodic agitation with the boost pump while filtration idles.
//!
//! Stirring alternates `duration` on and `period - duration` off, and only
//! starts inside the daylight window (it exists to cool the solar cover).
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};
use pool_traits::Switch;

use crate::config::StirCfg;
use crate::hw_error::log_device;
use crate::util::Timer;

#[derive(Debug)]
pub struct StirMode {
    stirring: bool,
    current: Timer,
    period: Duration,
    duration: Duration,
    daylight_start_hour: u32,
    daylight_end_hour: u32,
}

impl StirMode {
    pub fn new(cfg: &StirCfg) -> Self {
        Self {
            stirring: false,
            current: Timer::new("stir"),
            period: cfg.period,
            duration: cfg.duration,
            daylight_start_hour: cfg.daylight_start_hour,
            daylight_end_hour: cfg.daylight_end_hour,
        }
    }

    pub fn is_stirring(&self) -> bool {
        self.stirring
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Zero disables stirring. Rejected when shorter than the stir duration.
    pub fn set_period(&mut self, period: Duration) -> bool {
        if !period.is_zero() && period < self.duration {
            tracing::error!(?period, duration = ?self.duration, "stir period must be >= stir duration");
            return false;
        }
        self.period = period;
        tracing::info!(?period, "stir period set");
        true
    }

    pub fn set_duration(&mut self, duration: Duration) -> bool {
        if !self.period.is_zero() && self.period < duration {
            tracing::error!(period = ?self.period, ?duration, "stir period must be >= stir duration");
            return false;
        }
        self.duration = duration;
        tracing::info!(?duration, "stir duration set");
        true
    }

    fn in_daylight(&self, now: NaiveDateTime) -> bool {
        let hour = now.hour();
        let (start, end) = (self.daylight_start_hour, self.daylight_end_hour);
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    fn stir(&mut self, boost: &mut dyn Switch) {
        self.stirring = true;
        self.current.set_delay(self.duration);
        log_device("boost", boost.on());
        tracing::info!(duration = ?self.duration, "stir activated");
    }

    fn pause(&mut self, boost: &mut dyn Switch, rearm: bool) {
        if rearm {
            self.current.set_delay(self.period.saturating_sub(self.duration));
        }
        self.stirring = false;
        log_device("boost", boost.off());
        tracing::debug!(remaining = ?self.current.remaining(), "stir paused");
    }

    /// Stop stirring and wait a full pause before the next stir.
    pub fn clear(&mut self, boost: &mut dyn Switch) {
        self.pause(boost, true);
    }

    /// Stop stirring, keeping the current countdown.
    pub fn suspend(&mut self, boost: &mut dyn Switch) {
        self.pause(boost, false);
    }

    pub fn update(&mut self, now: NaiveDateTime, boost: &mut dyn Switch) {
        self.current.update(now, 1.0);
        if self.period.is_zero() || !self.current.elapsed() {
            return;
        }
        if self.stirring {
            self.pause(boost, true);
        } else if self.in_daylight(now) {
            self.stir(boost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pool_hardware::SimSwitch;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1981, 5, 30)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn stir() -> StirMode {
        StirMode::new(&StirCfg {
            period: Duration::from_secs(3600),
            duration: Duration::from_secs(600),
            daylight_start_hour: 10,
            daylight_end_hour: 18,
        })
    }

    #[test]
    fn alternates_inside_daylight() {
        let mut boost = SimSwitch::new("boost");
        let probe = boost.probe();
        let mut s = stir();
        s.clear(&mut boost);
        s.update(at(11, 0), &mut boost);
        s.update(at(11, 49), &mut boost);
        assert!(!probe.is_on());
        s.update(at(11, 50), &mut boost);
        assert!(probe.is_on());
        assert!(s.is_stirring());
        s.update(at(11, 51), &mut boost);
        s.update(at(12, 0), &mut boost);
        assert!(probe.is_on());
        s.update(at(12, 1), &mut boost);
        assert!(!probe.is_on());
    }

    #[test]
    fn never_starts_at_night() {
        let mut boost = SimSwitch::new("boost");
        let probe = boost.probe();
        let mut s = stir();
        s.clear(&mut boost);
        s.update(at(20, 0), &mut boost);
        s.update(at(23, 0), &mut boost);
        assert!(!probe.is_on());
    }

    #[test]
    fn zero_period_disables() {
        let mut boost = SimSwitch::new("boost");
        let probe = boost.probe();
        let mut s = stir();
        assert!(s.set_period(Duration::ZERO));
        s.update(at(11, 0), &mut boost);
        s.update(at(13, 0), &mut boost);
        assert!(!probe.is_on());
    }

    #[test]
    fn rejects_period_shorter_than_duration() {
        let mut s = stir();
        assert!(!s.set_period(Duration::from_secs(60)));
        assert_eq!(s.period(), Duration::from_secs(3600));
        assert!(!s.set_duration(Duration::from_secs(7200)));
        assert_eq!(s.duration(), Duration::from_secs(600));
    }

    #[test]
    fn wraps_daylight_over_midnight() {
        let s = StirMode::new(&StirCfg {
            daylight_start_hour: 22,
            daylight_end_hour: 2,
            ..StirCfg::default()
        });
        assert!(s.in_daylight(at(23, 0)));
        assert!(s.in_daylight(at(1, 0)));
        assert!(!s.in_daylight(at(12, 0)));
    }
}
