//! Duty-cycle dosing: a bounded proportional controller feeding a PWM actuator.
//!
//! The PWM splits each `period` into an on-phase of `value * period` and an
//! off-phase with the rest:
//! - an on-phase shorter than `min_runtime` is stretched to `min_runtime`,
//! - an on-phase longer than `period - min_runtime` becomes the whole period
//!   (the pump then never switches off),
//! - a daily on-time budget (`security_duration`) forces the pump off once
//!   spent and blocks new on-phases until the next 24h reset.
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use crossbeam_channel::Sender;
use pool_traits::Switch;

use crate::actor::{Actor, Context};
use crate::config::PwmCfg;
use crate::hw_error::log_device;
use crate::util::{DAY, Timer, add, constrain};

/// Proportional controller clamped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct PController {
    pub setpoint: f64,
    pub current: f64,
    pub pterm: f64,
    scale: f64,
}

impl PController {
    pub fn new(pterm: f64, scale: f64) -> Self {
        Self {
            setpoint: 0.0,
            current: 0.0,
            pterm,
            scale,
        }
    }

    pub fn compute(&self) -> f64 {
        let error = self.setpoint - self.current;
        constrain(self.pterm * self.scale * error, 0.0, 1.0)
    }
}

pub struct Pwm {
    name: &'static str,
    pump: Box<dyn Switch>,
    period: Duration,
    min_runtime: Duration,
    value: f64,
    phase: Duration,
    on: bool,
    last: Option<Instant>,
    security: Timer,
    security_reset: NaiveDateTime,
}

impl Pwm {
    pub fn new(name: &'static str, pump: Box<dyn Switch>, cfg: &PwmCfg, wall: NaiveDateTime) -> Self {
        let mut security = Timer::new(name);
        security.set_delay(cfg.security_duration);
        Self {
            name,
            pump,
            period: cfg.period,
            min_runtime: cfg.min_runtime,
            value: 0.0,
            phase: Duration::ZERO,
            on: false,
            last: None,
            security,
            security_reset: add(wall, DAY),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = constrain(value, 0.0, 1.0);
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// On-time spent from today's budget.
    pub fn security_used(&self) -> Duration {
        self.security.duration()
    }

    /// Effective `(on, off)` phase lengths for the current value.
    pub fn duty(&self) -> (Duration, Duration) {
        let period_ms = self.period.as_millis() as f64;
        let mut on = Duration::from_millis((period_ms * self.value).round() as u64);
        if !on.is_zero() && on < self.min_runtime {
            on = self.min_runtime;
        } else if on > self.period.saturating_sub(self.min_runtime) {
            on = self.period;
        }
        (on, self.period.saturating_sub(on))
    }

    fn switch(&mut self, on: bool) {
        self.phase = Duration::ZERO;
        self.on = on;
        let result = if on { self.pump.on() } else { self.pump.off() };
        log_device(self.name, result);
    }

    pub fn step(&mut self, now: Instant, wall: NaiveDateTime) {
        if let Some(last) = self.last {
            self.phase = (self.phase + now.saturating_duration_since(last)).min(self.period);
            let (duty_on, duty_off) = self.duty();
            if self.on {
                self.security.update(wall, 1.0);
                if self.security.elapsed() {
                    tracing::warn!(
                        pwm = self.name,
                        used = ?self.security.duration(),
                        "daily dosing budget spent, forcing pump off"
                    );
                    self.switch(false);
                } else if self.phase >= duty_on && duty_on != self.period {
                    self.switch(false);
                }
            } else {
                self.security.update(wall, 0.0);
                let security_ok = !self.security.elapsed();
                if self.phase >= duty_off && duty_off != self.period && security_ok {
                    self.switch(true);
                }
            }
        }
        if wall > self.security_reset {
            self.security.reset();
            while self.security_reset < wall {
                self.security_reset = add(self.security_reset, DAY);
            }
        }
        self.last = Some(now);
    }

    /// Pump off, start over with an off-phase on the next step.
    pub fn cancel(&mut self) {
        self.security.clear();
        self.last = None;
        if self.on {
            self.switch(false);
        } else {
            self.phase = Duration::ZERO;
            log_device(self.name, self.pump.off());
        }
    }
}

pub enum PwmMsg {
    Run,
    Tick,
    Cancel,
    SetValue(f64),
    SetPeriod(Duration),
    Value(Sender<f64>),
    IsOn(Sender<bool>),
}

/// Ticks a [`Pwm`] every second while running.
pub struct PwmActor {
    pwm: Pwm,
    tick: Duration,
    running: bool,
}

impl PwmActor {
    pub fn new(pwm: Pwm, tick: Duration) -> Self {
        Self {
            pwm,
            tick,
            running: false,
        }
    }

    pub fn pwm(&self) -> &Pwm {
        &self.pwm
    }

    fn step(&mut self, ctx: &mut Context<PwmMsg>) {
        self.pwm.step(ctx.now(), ctx.wall_now());
        ctx.schedule_delay(self.tick, PwmMsg::Tick);
    }
}

impl Actor for PwmActor {
    type Msg = PwmMsg;

    fn handle(&mut self, msg: PwmMsg, ctx: &mut Context<PwmMsg>) {
        match msg {
            PwmMsg::Run => {
                if !self.running {
                    self.running = true;
                    tracing::debug!(pwm = ctx.name(), "pwm running");
                    self.step(ctx);
                }
            }
            PwmMsg::Tick => {
                if self.running {
                    self.step(ctx);
                }
            }
            PwmMsg::Cancel => {
                ctx.cancel();
                self.running = false;
                self.pwm.cancel();
            }
            PwmMsg::SetValue(v) => self.pwm.set_value(v),
            PwmMsg::SetPeriod(p) => self.pwm.set_period(p),
            PwmMsg::Value(reply) => {
                let _ = reply.send(self.pwm.value());
            }
            PwmMsg::IsOn(reply) => {
                let _ = reply.send(self.pwm.is_on());
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Context<PwmMsg>) {
        self.pwm.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pool_hardware::{SimSwitch, SwitchProbe};
    use proptest::prelude::*;
    use rstest::rstest;

    fn wall0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1981, 5, 30)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap()
    }

    fn pwm(security: Duration) -> (Pwm, SwitchProbe) {
        let pump = SimSwitch::new("ph");
        let probe = pump.probe();
        let cfg = PwmCfg {
            period: Duration::from_secs(120),
            min_runtime: Duration::from_secs(3),
            security_duration: security,
            tick: Duration::from_secs(1),
        };
        (Pwm::new("ph", Box::new(pump), &cfg, wall0()), probe)
    }

    /// Step once per second for `secs` seconds, returning the seconds spent on.
    fn run(p: &mut Pwm, probe: &SwitchProbe, t0: Instant, from: u64, secs: u64) -> u64 {
        let mut on = 0;
        for s in from..from + secs {
            let d = Duration::from_secs(s);
            p.step(t0 + d, add(wall0(), d));
            on += u64::from(probe.is_on());
        }
        on
    }

    #[rstest]
    #[case(-1.0, 1.0, 7.0, 7.5, 0.5)]
    #[case(-1.0, 1.0, 7.0, 6.5, 0.0)]
    #[case(1.0, 0.005, 600.0, 500.0, 0.5)]
    #[case(1.0, 0.005, 600.0, 300.0, 1.0)]
    #[case(1.0, 0.005, 600.0, 650.0, 0.0)]
    fn p_controller_is_clamped(
        #[case] pterm: f64,
        #[case] scale: f64,
        #[case] setpoint: f64,
        #[case] current: f64,
        #[case] expected: f64,
    ) {
        let mut c = PController::new(pterm, scale);
        c.setpoint = setpoint;
        c.current = current;
        assert!((c.compute() - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case(0.0, 0, 120)]
    #[case(0.01, 3, 117)]
    #[case(0.5, 60, 60)]
    #[case(0.99, 120, 0)]
    #[case(1.0, 120, 0)]
    fn duty_boundaries(#[case] value: f64, #[case] on: u64, #[case] off: u64) {
        let (mut p, _) = pwm(Duration::from_secs(4 * 3600));
        p.set_value(value);
        assert_eq!(p.duty(), (Duration::from_secs(on), Duration::from_secs(off)));
    }

    #[test]
    fn zero_duty_never_switches_on() {
        let (mut p, probe) = pwm(Duration::from_secs(4 * 3600));
        assert_eq!(run(&mut p, &probe, Instant::now(), 0, 600), 0);
    }

    #[test]
    fn full_duty_never_switches_off() {
        let (mut p, probe) = pwm(Duration::from_secs(4 * 3600));
        p.set_value(1.0);
        assert_eq!(run(&mut p, &probe, Instant::now(), 0, 600), 599);
        assert!(probe.is_on());
    }

    #[test]
    fn budget_breach_forces_off_until_next_day() {
        let (mut p, probe) = pwm(Duration::from_secs(600));
        p.set_value(1.0);
        let t0 = Instant::now();
        assert_eq!(run(&mut p, &probe, t0, 0, 7200), 600);
        assert!(!probe.is_on());
        assert!(p.security_used() >= Duration::from_secs(600));

        // one day later the budget is available again
        let on = run(&mut p, &probe, t0, 86_400 + 60, 10);
        assert!(on > 0);
    }

    #[test]
    fn cancel_turns_pump_off_and_restarts_with_off_phase() {
        let (mut p, probe) = pwm(Duration::from_secs(4 * 3600));
        p.set_value(0.5);
        let t0 = Instant::now();
        run(&mut p, &probe, t0, 0, 70);
        assert!(probe.is_on());
        p.cancel();
        assert!(!probe.is_on());
        assert!(!p.is_on());
        assert_eq!(run(&mut p, &probe, t0, 100, 60), 0);
    }

    proptest! {
        #[test]
        fn on_time_tracks_duty(n in 3u64..=117, k in 1u64..=4) {
            let (mut p, probe) = pwm(Duration::from_secs(24 * 3600));
            p.set_value(n as f64 / 120.0);
            let on = run(&mut p, &probe, Instant::now(), 0, k * 120);
            prop_assert!(on.abs_diff(n * k) <= 3, "on={on} expected={}", n * k);
        }
    }

    mod actor {
        use super::*;
        use crate::actor::{ActorCell, mailbox};
        use pool_traits::clock::test_clock::TestClock;
        use std::sync::Arc;

        #[test]
        fn ticks_every_second_until_cancelled() {
            let clock = TestClock::new();
            let (p, probe) = pwm(Duration::from_secs(4 * 3600));
            let (addr, mb) = mailbox("ph", Duration::from_millis(100));
            let mut cell = ActorCell::new(PwmActor::new(p, Duration::from_secs(1)), mb, Arc::new(clock.clone()));
            addr.send(PwmMsg::SetValue(0.5));
            addr.send(PwmMsg::Run);
            addr.send(PwmMsg::Run);
            cell.run_pending();
            assert_eq!(cell.context().pending_timers(), 1);
            for _ in 0..61 {
                clock.advance(Duration::from_secs(1));
                cell.run_pending();
            }
            assert!(probe.is_on());
            addr.send(PwmMsg::Cancel);
            cell.run_pending();
            assert!(!probe.is_on());
            assert_eq!(cell.context().pending_timers(), 0);
            assert!((cell.actor().pwm().value() - 0.5).abs() < f64::EPSILON);
        }
    }
}
