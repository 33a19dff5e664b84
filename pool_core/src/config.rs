//! Runtime configuration types for the pool actors.
//!
//! These are the typed values the actors run with. They are separate from the
//! TOML-deserialized config in `pool_config`; see `conversions` for the bridge.
use std::time::Duration;

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Actor runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeCfg {
    /// Bounded wait for cross-actor queries.
    pub ask_timeout: Duration,
    /// Cadence of state refresh ticks.
    pub refresh: Duration,
}

impl Default for RuntimeCfg {
    fn default() -> Self {
        Self {
            ask_timeout: Duration::from_millis(1000),
            refresh: secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StirCfg {
    /// Zero disables stirring.
    pub period: Duration,
    pub duration: Duration,
    /// Local hours `[start, end)` during which stirring may start.
    pub daylight_start_hour: u32,
    pub daylight_end_hour: u32,
}

impl Default for StirCfg {
    fn default() -> Self {
        Self {
            period: secs(3600),
            duration: secs(120),
            daylight_start_hour: 10,
            daylight_end_hour: 18,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackwashCfg {
    /// Days between two backwashes.
    pub period_days: u32,
    pub backwash: Duration,
    pub rinse: Duration,
    /// Pause between opening two valves of the backwash sequence.
    pub valve_step: Duration,
}

impl Default for BackwashCfg {
    fn default() -> Self {
        Self {
            period_days: 30,
            backwash: secs(120),
            rinse: secs(60),
            valve_step: secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WinteringCfg {
    pub period: Duration,
    /// Stir only when the air temperature is at or below this value.
    pub only_below: f64,
    pub duration: Duration,
    pub pump_speed: u8,
    pub swim_period: Duration,
    pub swim_only_below: f64,
    pub swim_duration: Duration,
}

impl Default for WinteringCfg {
    fn default() -> Self {
        Self {
            period: secs(3 * 3600),
            only_below: 2.0,
            duration: secs(600),
            pump_speed: 1,
            swim_period: secs(3 * 3600),
            swim_only_below: 2.0,
            swim_duration: secs(600),
        }
    }
}

/// Filtration orchestrator configuration.
#[derive(Debug, Clone)]
pub struct FiltrationCfg {
    /// Daily filtration target.
    pub daily: Duration,
    pub period: u32,
    pub reset_hour: u32,
    pub tank_percentage: f64,
    pub boost_duration: Duration,
    pub speed_eco: u8,
    pub speed_standby: u8,
    /// 1..=3 drive the variable pump, 4 adds the boost pump.
    pub speed_overflow: u8,
    pub cover_position_eco: u8,
    pub refresh: Duration,
    /// Cadence of cover position polls while opening or closing.
    pub cover_poll: Duration,
    /// Extra wait once the cover reports its end position.
    pub cover_settle: Duration,
    /// Delay from `eco.compute` to the first eco phase.
    pub compute_delay: Duration,
    pub heating_delay_to_eco: Duration,
    pub heating_delay_to_open: Duration,
    pub stir: StirCfg,
    pub backwash: BackwashCfg,
    pub wintering: WinteringCfg,
}

impl Default for FiltrationCfg {
    fn default() -> Self {
        Self {
            daily: secs(10 * 3600),
            period: 3,
            reset_hour: 0,
            tank_percentage: 0.1,
            boost_duration: secs(300),
            speed_eco: 1,
            speed_standby: 1,
            speed_overflow: 4,
            cover_position_eco: 0,
            refresh: secs(10),
            cover_poll: secs(5),
            cover_settle: secs(2),
            compute_delay: secs(5),
            heating_delay_to_eco: secs(300),
            heating_delay_to_open: secs(180),
            stir: StirCfg::default(),
            backwash: BackwashCfg::default(),
            wintering: WinteringCfg::default(),
        }
    }
}

/// Pair of tank thresholds (percent of tank height).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone)]
pub struct TankCfg {
    pub hysteresis: f64,
    pub too_low: f64,
    pub eco: Levels,
    pub overflow: Levels,
    pub refresh: Duration,
    /// Maximum dwell in `fill` before everything is halted.
    pub fill_timeout: Duration,
    /// Maximum dwell in `low` before everything is halted.
    pub low_timeout: Duration,
}

impl Default for TankCfg {
    fn default() -> Self {
        Self {
            hysteresis: 3.0,
            too_low: 10.0,
            eco: Levels {
                low: 30.0,
                high: 50.0,
            },
            overflow: Levels {
                low: 50.0,
                high: 70.0,
            },
            refresh: secs(10),
            fill_timeout: secs(2 * 3600),
            low_timeout: secs(6 * 3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeatingCfg {
    pub enable: bool,
    pub setpoint: f64,
    pub start_hour: u32,
    pub min_temp: f64,
    pub hysteresis_down: f64,
    pub hysteresis_up: f64,
    pub hysteresis_min_temp: f64,
    pub recover_period: Duration,
    pub refresh: Duration,
}

impl Default for HeatingCfg {
    fn default() -> Self {
        Self {
            enable: true,
            setpoint: 26.0,
            start_hour: 1,
            min_temp: 15.0,
            hysteresis_down: 0.5,
            hysteresis_up: 0.5,
            hysteresis_min_temp: 1.0,
            recover_period: secs(600),
            refresh: secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaterCfg {
    pub setpoint: f64,
    pub hysteresis_down: f64,
    pub hysteresis_up: f64,
    pub refresh: Duration,
}

impl Default for HeaterCfg {
    fn default() -> Self {
        Self {
            setpoint: 5.0,
            hysteresis_down: 0.5,
            hysteresis_up: 0.5,
            refresh: secs(10),
        }
    }
}

/// Dosing pump timing shared by the pH and chlorine PWMs.
#[derive(Debug, Clone)]
pub struct PwmCfg {
    pub period: Duration,
    pub min_runtime: Duration,
    /// Daily on-time budget of the pump.
    pub security_duration: Duration,
    pub tick: Duration,
}

impl Default for PwmCfg {
    fn default() -> Self {
        Self {
            period: secs(120),
            min_runtime: secs(3),
            security_duration: secs(4 * 3600),
            tick: secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisinfectionCfg {
    pub disabled: bool,
    pub start_delay: Duration,
    pub waiting_delay: Duration,
    pub ph_pwm: PwmCfg,
    pub cl_pwm: PwmCfg,
    pub constant_cl_duty: f64,
    pub ph_enable: bool,
    pub ph_setpoint: f64,
    pub ph_pterm: f64,
    pub orp_enable: bool,
    pub orp_setpoint: f64,
    pub orp_pterm: f64,
    pub orp_scale: f64,
}

impl Default for DisinfectionCfg {
    fn default() -> Self {
        Self {
            disabled: false,
            start_delay: secs(600),
            waiting_delay: secs(1800),
            ph_pwm: PwmCfg::default(),
            cl_pwm: PwmCfg::default(),
            constant_cl_duty: 0.2,
            ph_enable: true,
            ph_setpoint: 7.0,
            ph_pterm: 1.0,
            orp_enable: true,
            orp_setpoint: 600.0,
            orp_pterm: 1.0,
            orp_scale: 0.005,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwimCfg {
    pub timer: Duration,
    /// Pump speed in percent.
    pub speed: u8,
    pub refresh: Duration,
    pub wintering_poll: Duration,
}

impl Default for SwimCfg {
    fn default() -> Self {
        Self {
            timer: secs(5 * 60),
            speed: 50,
            refresh: secs(1),
            wintering_poll: secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorsCfg {
    pub sample: Duration,
    pub disinfection_window: Duration,
    pub temperature_window: Duration,
}

impl SensorsCfg {
    /// Number of samples kept for a window, at least one.
    pub fn samples(&self, window: Duration) -> usize {
        let sample = self.sample.as_secs().max(1);
        usize::try_from(window.as_secs() / sample).unwrap_or(usize::MAX).max(1)
    }
}

impl Default for SensorsCfg {
    fn default() -> Self {
        Self {
            sample: secs(60),
            disinfection_window: secs(300),
            temperature_window: secs(1800),
        }
    }
}

/// Everything needed to wire a plant.
#[derive(Debug, Clone)]
pub struct PlantCfg {
    pub runtime: RuntimeCfg,
    pub filtration: FiltrationCfg,
    pub heating: HeatingCfg,
    pub heater: HeaterCfg,
    pub tank: TankCfg,
    pub disinfection: DisinfectionCfg,
    pub swim: SwimCfg,
    pub sensors: SensorsCfg,
    /// Cadence of the cover controller's water meter poll.
    pub cover_refresh: Duration,
}

impl Default for PlantCfg {
    fn default() -> Self {
        Self {
            runtime: RuntimeCfg::default(),
            filtration: FiltrationCfg::default(),
            heating: HeatingCfg::default(),
            heater: HeaterCfg::default(),
            tank: TankCfg::default(),
            disinfection: DisinfectionCfg::default(),
            swim: SwimCfg::default(),
            sensors: SensorsCfg::default(),
            cover_refresh: secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_covers_window() {
        let cfg = SensorsCfg::default();
        assert_eq!(cfg.samples(cfg.disinfection_window), 5);
        assert_eq!(cfg.samples(cfg.temperature_window), 30);
        assert_eq!(cfg.samples(Duration::from_secs(10)), 1);
    }
}
