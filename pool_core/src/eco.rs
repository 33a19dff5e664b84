//! Daily filtration budget.
//!
//! The day is split into `period` on/off cycles ending at the configured reset
//! hour. Each time the orchestrator enters `eco.compute`, [`EcoMode::compute`]
//! spreads what is left of the daily target over the cycles left before the
//! reset:
//!
//! ```text
//! on   = max(1h, min(remaining_time, remaining_duration / remaining_periods))
//! off  = max(0, (remaining_time - remaining_duration) / remaining_periods)
//! tank = max(1min, tank_percentage * on)      on -= tank when on > tank
//! ```
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};

use crate::status::Encoder;
use crate::util::{DAY, HOUR, MINUTE, Timer, add, hms, round_secs, span};

/// Minimum interval between two persisted duration publications.
const SAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub struct EcoMode {
    encoder: Encoder,
    /// Daily budget: delay is the target, duration what ran since the last reset.
    filtration: Timer,
    /// Current on/off/tank phase.
    current: Timer,
    reset_hour: u32,
    next_reset: NaiveDateTime,
    period: u32,
    tank_percentage: f64,
    period_duration: Duration,
    on_duration: Duration,
    off_duration: Duration,
    tank_duration: Duration,
    last_save: NaiveDateTime,
}

impl EcoMode {
    pub fn new(now: NaiveDateTime, encoder: Encoder) -> Self {
        let mut eco = Self {
            encoder,
            filtration: Timer::new("filtration"),
            current: Timer::new("current"),
            reset_hour: 0,
            next_reset: now,
            period: 3,
            tank_percentage: 0.1,
            period_duration: HOUR,
            on_duration: Duration::ZERO,
            off_duration: Duration::ZERO,
            tank_duration: Duration::ZERO,
            last_save: now,
        };
        eco.set_reset_hour(0, now);
        eco.set_daily(10 * HOUR);
        eco
    }

    /// Next reset strictly after `now`.
    pub fn set_reset_hour(&mut self, hour: u32, now: NaiveDateTime) {
        self.reset_hour = hour.min(23);
        let at = NaiveTime::from_hms_opt(self.reset_hour, 0, 0).unwrap_or_default();
        let mut next = now.date().and_time(at);
        if next <= now {
            next = add(next, DAY);
        }
        self.next_reset = next;
    }

    pub fn reset_hour(&self) -> u32 {
        self.reset_hour
    }

    pub fn next_reset(&self) -> NaiveDateTime {
        self.next_reset
    }

    /// Change the daily target. What already ran today is kept.
    pub fn set_daily(&mut self, daily: Duration) {
        self.filtration.set_delay_keep(daily);
        self.recompute_period_duration();
    }

    pub fn daily(&self) -> Duration {
        self.filtration.delay()
    }

    pub fn set_period(&mut self, period: u32) {
        self.period = period.max(1);
        self.recompute_period_duration();
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn set_tank_percentage(&mut self, value: f64) {
        self.tank_percentage = value.clamp(0.0, 1.0);
    }

    pub fn tank_percentage(&self) -> f64 {
        self.tank_percentage
    }

    /// Restore today's elapsed duration (persisted across restarts).
    pub fn restore_elapsed(&mut self, elapsed: Duration) {
        self.filtration.set_duration(elapsed);
    }

    pub fn elapsed(&self) -> Duration {
        self.filtration.duration()
    }

    pub fn remaining(&self) -> Duration {
        self.filtration.remaining()
    }

    pub fn on_duration(&self) -> Duration {
        self.on_duration
    }

    pub fn off_duration(&self) -> Duration {
        self.off_duration
    }

    pub fn tank_duration(&self) -> Duration {
        self.tank_duration
    }

    fn recompute_period_duration(&mut self) {
        self.period_duration = (self.filtration.delay() / self.period).max(Duration::from_secs(1));
    }

    /// Stop both timers; the next update only records its reference instant.
    pub fn clear(&mut self) {
        self.filtration.clear();
        self.current.set_delay(Duration::ZERO);
        self.encoder.publish("filtration/next", hms(self.current.remaining()));
    }

    pub fn compute(&mut self, now: NaiveDateTime) {
        let remaining_duration = self.filtration.remaining();
        let remaining_periods = u32::try_from(
            (remaining_duration.as_nanos() / self.period_duration.as_nanos()).max(1),
        )
        .unwrap_or(u32::MAX);
        let remaining_time = span(now, self.next_reset);
        tracing::info!(
            remaining_duration = %hms(remaining_duration),
            remaining_periods,
            remaining_time = %hms(remaining_time),
            "eco compute"
        );

        self.on_duration = remaining_time
            .min(remaining_duration / remaining_periods)
            .max(HOUR);
        self.off_duration = remaining_time.saturating_sub(remaining_duration) / remaining_periods;
        self.tank_duration = round_secs(self.on_duration.mul_f64(self.tank_percentage)).max(MINUTE);
        if self.on_duration > self.tank_duration {
            self.on_duration -= self.tank_duration;
        }
        tracing::info!(
            on = %hms(self.on_duration),
            tank = %hms(self.tank_duration),
            off = %hms(self.off_duration),
            "eco durations"
        );
    }

    /// Start a new phase of `duration`.
    pub fn set_current(&mut self, duration: Duration) {
        self.current.set_delay(duration);
    }

    pub fn current_remaining(&self) -> Duration {
        self.current.remaining()
    }

    /// Account the time since the previous update. `factor` scales how much of
    /// it counts toward the daily target (0 while the pump is off).
    ///
    /// Returns true when the daily reset boundary was crossed; the part of the
    /// interval after the boundary already counts toward the new day.
    pub fn update(&mut self, now: NaiveDateTime, factor: f64) -> bool {
        self.current.update(now, 1.0);
        let mut reset = false;
        if now >= self.next_reset {
            let boundary = self.next_reset;
            let running = self.filtration.is_running();
            if running {
                self.filtration.update(boundary, factor);
            }
            tracing::info!(elapsed = %hms(self.filtration.duration()), "daily filtration reset");
            self.filtration.reset();
            if running {
                self.filtration.update(boundary, factor);
            }
            while self.next_reset <= now {
                self.next_reset = add(self.next_reset, DAY);
            }
            reset = true;
        }
        self.filtration.update(now, factor);

        self.encoder.publish("filtration/next", hms(self.current.remaining()));
        let remaining = Duration::from_secs(self.filtration.remaining().as_secs());
        self.encoder.publish("filtration/remaining", hms(remaining));
        if span(self.last_save, now) > SAVE_INTERVAL || reset {
            self.last_save = now;
            self.encoder.publish_retained(
                "filtration/duration",
                round_secs(self.filtration.duration()).as_secs(),
            );
        }
        reset
    }

    /// The on-phase (or the whole day) is done.
    pub fn elapsed_on(&self) -> bool {
        self.current.elapsed() || self.filtration.elapsed()
    }

    /// The off-phase is done and there is still filtration left for today.
    pub fn elapsed_off(&self) -> bool {
        self.current.elapsed() && !self.filtration.elapsed()
    }
}
