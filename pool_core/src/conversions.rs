//! `From` implementations bridging `pool_config` types to `pool_core` types.
//!
//! Timing values the TOML schema does not expose keep their runtime defaults.

use std::time::Duration;

use crate::config::{
    BackwashCfg, DisinfectionCfg, FiltrationCfg, HeaterCfg, HeatingCfg, Levels, PlantCfg, PwmCfg,
    RuntimeCfg, SensorsCfg, StirCfg, SwimCfg, TankCfg, WinteringCfg,
};

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// ── RuntimeCfg ───────────────────────────────────────────────────────────────

impl From<&pool_config::Runtime> for RuntimeCfg {
    fn from(c: &pool_config::Runtime) -> Self {
        Self {
            ask_timeout: Duration::from_millis(c.ask_timeout_ms),
            refresh: secs(c.refresh_secs),
        }
    }
}

// ── Filtration ───────────────────────────────────────────────────────────────

impl From<&pool_config::Stir> for StirCfg {
    fn from(c: &pool_config::Stir) -> Self {
        Self {
            period: secs(c.period_secs),
            duration: secs(c.duration_secs),
            daylight_start_hour: c.daylight_start_hour,
            daylight_end_hour: c.daylight_end_hour,
        }
    }
}

impl From<&pool_config::Backwash> for BackwashCfg {
    fn from(c: &pool_config::Backwash) -> Self {
        Self {
            period_days: c.period_days,
            backwash: secs(c.backwash_secs),
            rinse: secs(c.rinse_secs),
            ..Self::default()
        }
    }
}

impl From<&pool_config::Wintering> for WinteringCfg {
    fn from(c: &pool_config::Wintering) -> Self {
        Self {
            period: secs(c.period_secs),
            only_below: c.only_below,
            duration: secs(c.duration_secs),
            pump_speed: c.pump_speed,
            swim_period: secs(c.swim_period_secs),
            swim_only_below: c.swim_only_below,
            swim_duration: secs(c.swim_duration_secs),
        }
    }
}

impl From<&pool_config::Config> for FiltrationCfg {
    fn from(c: &pool_config::Config) -> Self {
        let f = &c.filtration;
        Self {
            daily: secs(f.duration_secs),
            period: f.period,
            reset_hour: f.reset_hour,
            tank_percentage: f.tank_percentage,
            boost_duration: secs(f.boost_duration_secs),
            speed_eco: f.speed_eco,
            speed_standby: f.speed_standby,
            speed_overflow: f.speed_overflow,
            cover_position_eco: f.cover_position_eco,
            refresh: secs(c.runtime.refresh_secs),
            heating_delay_to_eco: secs(c.heating.delay_to_eco_secs),
            heating_delay_to_open: secs(c.heating.delay_to_open_secs),
            stir: (&c.stir).into(),
            backwash: (&c.backwash).into(),
            wintering: (&c.wintering).into(),
            ..Self::default()
        }
    }
}

// ── Tank ─────────────────────────────────────────────────────────────────────

impl From<&pool_config::Tank> for TankCfg {
    fn from(c: &pool_config::Tank) -> Self {
        Self {
            hysteresis: c.hysteresis,
            too_low: c.too_low,
            eco: Levels {
                low: c.eco_low,
                high: c.eco_high,
            },
            overflow: Levels {
                low: c.overflow_low,
                high: c.overflow_high,
            },
            ..Self::default()
        }
    }
}

// ── Heating / Heater ─────────────────────────────────────────────────────────

impl From<&pool_config::Heating> for HeatingCfg {
    fn from(c: &pool_config::Heating) -> Self {
        Self {
            enable: c.enable,
            setpoint: c.setpoint,
            start_hour: c.start_hour,
            min_temp: c.min_temp,
            hysteresis_down: c.hysteresis_down,
            hysteresis_up: c.hysteresis_up,
            hysteresis_min_temp: c.hysteresis_min_temp,
            recover_period: secs(c.recover_period_secs),
            ..Self::default()
        }
    }
}

impl From<&pool_config::Heater> for HeaterCfg {
    fn from(c: &pool_config::Heater) -> Self {
        Self {
            setpoint: c.setpoint,
            hysteresis_down: c.hysteresis_down,
            hysteresis_up: c.hysteresis_up,
            ..Self::default()
        }
    }
}

// ── Disinfection ─────────────────────────────────────────────────────────────

impl From<&pool_config::Disinfection> for DisinfectionCfg {
    fn from(c: &pool_config::Disinfection) -> Self {
        let pwm = |period: u64| PwmCfg {
            period: secs(period),
            min_runtime: secs(c.min_runtime_secs),
            security_duration: secs(c.security_duration_hours * 3600),
            ..PwmCfg::default()
        };
        Self {
            disabled: c.disabled,
            start_delay: secs(c.start_delay_secs),
            waiting_delay: secs(c.waiting_delay_secs),
            ph_pwm: pwm(c.ph_pwm_period_secs),
            cl_pwm: pwm(c.cl_pwm_period_secs),
            constant_cl_duty: c.constant_cl_duty,
            ph_enable: c.ph_enable,
            ph_setpoint: c.ph_setpoint,
            ph_pterm: c.ph_pterm,
            orp_enable: c.orp_enable,
            orp_setpoint: c.orp_setpoint,
            orp_pterm: c.orp_pterm,
            orp_scale: c.orp_scale,
        }
    }
}

// ── Swim / Sensors ───────────────────────────────────────────────────────────

impl From<&pool_config::Swim> for SwimCfg {
    fn from(c: &pool_config::Swim) -> Self {
        Self {
            timer: secs(c.timer_minutes * 60),
            speed: c.speed,
            ..Self::default()
        }
    }
}

impl From<&pool_config::Sensors> for SensorsCfg {
    fn from(c: &pool_config::Sensors) -> Self {
        Self {
            sample: secs(c.sample_secs),
            disinfection_window: secs(c.disinfection_window_secs),
            temperature_window: secs(c.temperature_window_secs),
        }
    }
}

// ── PlantCfg ─────────────────────────────────────────────────────────────────

impl From<&pool_config::Config> for PlantCfg {
    fn from(c: &pool_config::Config) -> Self {
        let refresh = secs(c.runtime.refresh_secs);
        let mut tank = TankCfg::from(&c.tank);
        tank.refresh = refresh;
        let mut heating = HeatingCfg::from(&c.heating);
        heating.refresh = refresh;
        let mut heater = HeaterCfg::from(&c.heater);
        heater.refresh = refresh;
        Self {
            runtime: (&c.runtime).into(),
            filtration: c.into(),
            heating,
            heater,
            tank,
            disinfection: (&c.disinfection).into(),
            swim: (&c.swim).into(),
            sensors: (&c.sensors).into(),
            ..Self::default()
        }
    }
}
