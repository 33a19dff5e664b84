#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the pool controller.
//!
//! - `Config` and its sections are deserialized from TOML; every section is
//!   optional and falls back to the defaults below.
//! - `Config::validate` rejects values the controller cannot run with.
//!
//! Durations are expressed in seconds unless the key says otherwise.
use std::path::Path;

use eyre::WrapErr;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub runtime: Runtime,
    pub filtration: Filtration,
    pub stir: Stir,
    pub backwash: Backwash,
    pub heating: Heating,
    pub heater: Heater,
    pub wintering: Wintering,
    pub tank: Tank,
    pub disinfection: Disinfection,
    pub swim: Swim,
    pub sensors: Sensors,
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Runtime {
    /// Bounded wait for cross-actor queries (ms).
    pub ask_timeout_ms: u64,
    /// Cadence of the periodic state refresh (s).
    pub refresh_secs: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            ask_timeout_ms: 1000,
            refresh_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Filtration {
    /// Daily filtration target.
    pub duration_secs: u64,
    /// Number of on/off periods per day.
    pub period: u32,
    /// Local hour at which the daily budget resets.
    pub reset_hour: u32,
    /// Share of each on-period spent pumping from the tank.
    pub tank_percentage: f64,
    pub boost_duration_secs: u64,
    pub speed_eco: u8,
    pub speed_standby: u8,
    /// 1..=3 variable pump speed, 4 adds the boost pump.
    pub speed_overflow: u8,
    /// Cover position (%) at which the cover counts as closed.
    pub cover_position_eco: u8,
}

impl Default for Filtration {
    fn default() -> Self {
        Self {
            duration_secs: 10 * 3600,
            period: 3,
            reset_hour: 0,
            tank_percentage: 0.1,
            boost_duration_secs: 5 * 60,
            speed_eco: 1,
            speed_standby: 1,
            speed_overflow: 4,
            cover_position_eco: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Stir {
    /// 0 disables stirring.
    pub period_secs: u64,
    pub duration_secs: u64,
    /// Stirring only happens between these local hours.
    pub daylight_start_hour: u32,
    pub daylight_end_hour: u32,
}

impl Default for Stir {
    fn default() -> Self {
        Self {
            period_secs: 3600,
            duration_secs: 120,
            daylight_start_hour: 10,
            daylight_end_hour: 18,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Backwash {
    pub period_days: u32,
    pub backwash_secs: u64,
    pub rinse_secs: u64,
}

impl Default for Backwash {
    fn default() -> Self {
        Self {
            period_days: 30,
            backwash_secs: 120,
            rinse_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Heating {
    pub enable: bool,
    pub setpoint: f64,
    pub start_hour: u32,
    pub min_temp: f64,
    pub hysteresis_down: f64,
    pub hysteresis_up: f64,
    pub hysteresis_min_temp: f64,
    pub recover_period_secs: u64,
    /// Filtration delay before going back to eco after heating.
    pub delay_to_eco_secs: u64,
    /// Filtration delay before opening the cover after heating.
    pub delay_to_open_secs: u64,
}

impl Default for Heating {
    fn default() -> Self {
        Self {
            enable: true,
            setpoint: 26.0,
            start_hour: 1,
            min_temp: 15.0,
            hysteresis_down: 0.5,
            hysteresis_up: 0.5,
            hysteresis_min_temp: 1.0,
            recover_period_secs: 600,
            delay_to_eco_secs: 300,
            delay_to_open_secs: 180,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Heater {
    pub setpoint: f64,
    pub hysteresis_down: f64,
    pub hysteresis_up: f64,
}

impl Default for Heater {
    fn default() -> Self {
        Self {
            setpoint: 5.0,
            hysteresis_down: 0.5,
            hysteresis_up: 0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Wintering {
    pub period_secs: u64,
    pub only_below: f64,
    pub duration_secs: u64,
    pub pump_speed: u8,
    pub swim_period_secs: u64,
    pub swim_only_below: f64,
    pub swim_duration_secs: u64,
}

impl Default for Wintering {
    fn default() -> Self {
        Self {
            period_secs: 3 * 3600,
            only_below: 2.0,
            duration_secs: 10 * 60,
            pump_speed: 1,
            swim_period_secs: 3 * 3600,
            swim_only_below: 2.0,
            swim_duration_secs: 10 * 60,
        }
    }
}

/// Tank levels in percent of the tank height.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Tank {
    pub hysteresis: f64,
    pub too_low: f64,
    pub eco_low: f64,
    pub eco_high: f64,
    pub overflow_low: f64,
    pub overflow_high: f64,
}

impl Default for Tank {
    fn default() -> Self {
        Self {
            hysteresis: 3.0,
            too_low: 10.0,
            eco_low: 30.0,
            eco_high: 50.0,
            overflow_low: 50.0,
            overflow_high: 70.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Disinfection {
    pub disabled: bool,
    /// Daily on-time budget per dosing pump (hours).
    pub security_duration_hours: u64,
    pub start_delay_secs: u64,
    pub waiting_delay_secs: u64,
    pub ph_pwm_period_secs: u64,
    pub cl_pwm_period_secs: u64,
    pub min_runtime_secs: u64,
    /// Chlorine duty used while the filtration asks for a constant flow.
    pub constant_cl_duty: f64,
    pub ph_enable: bool,
    pub ph_setpoint: f64,
    pub ph_pterm: f64,
    pub orp_enable: bool,
    pub orp_setpoint: f64,
    pub orp_pterm: f64,
    pub orp_scale: f64,
}

impl Default for Disinfection {
    fn default() -> Self {
        Self {
            disabled: false,
            security_duration_hours: 4,
            start_delay_secs: 10 * 60,
            waiting_delay_secs: 30 * 60,
            ph_pwm_period_secs: 120,
            cl_pwm_period_secs: 120,
            min_runtime_secs: 3,
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Swim {
    pub timer_minutes: u64,
    /// Swim pump speed in percent.
    pub speed: u8,
}

impl Default for Swim {
    fn default() -> Self {
        Self {
            timer_minutes: 5,
            speed: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sensors {
    pub sample_secs: u64,
    /// Averaging window for pH/ORP probes.
    pub disinfection_window_secs: u64,
    /// Averaging window for temperature probes.
    pub temperature_window_secs: u64,
}

impl Default for Sensors {
    fn default() -> Self {
        Self {
            sample_secs: 60,
            disinfection_window_secs: 5 * 60,
            temperature_window_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parsing config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Runtime
        if self.runtime.ask_timeout_ms == 0 {
            eyre::bail!("runtime.ask_timeout_ms must be > 0");
        }
        if self.runtime.refresh_secs == 0 {
            eyre::bail!("runtime.refresh_secs must be > 0");
        }

        // Filtration
        let f = &self.filtration;
        if !(1..=172_800).contains(&f.duration_secs) {
            eyre::bail!("filtration.duration_secs must be in [1, 172800]");
        }
        if !(1..=10).contains(&f.period) {
            eyre::bail!("filtration.period must be in [1, 10]");
        }
        if f.reset_hour > 23 {
            eyre::bail!("filtration.reset_hour must be in [0, 23]");
        }
        if !(0.0..=0.5).contains(&f.tank_percentage) {
            eyre::bail!("filtration.tank_percentage must be in [0.0, 0.5]");
        }
        if f.boost_duration_secs > 600 {
            eyre::bail!("filtration.boost_duration_secs must be <= 600");
        }
        if !(1..=3).contains(&f.speed_eco) {
            eyre::bail!("filtration.speed_eco must be in [1, 3]");
        }
        if f.speed_standby > 2 {
            eyre::bail!("filtration.speed_standby must be in [0, 2]");
        }
        if !(1..=4).contains(&f.speed_overflow) {
            eyre::bail!("filtration.speed_overflow must be in [1, 4]");
        }
        if f.cover_position_eco > 100 {
            eyre::bail!("filtration.cover_position_eco must be in [0, 100]");
        }

        // Stir
        if self.stir.period_secs > 0 && self.stir.period_secs < self.stir.duration_secs {
            eyre::bail!("stir.period_secs must be >= stir.duration_secs");
        }
        if self.stir.daylight_start_hour > 23 || self.stir.daylight_end_hour > 24 {
            eyre::bail!("stir daylight hours must be within a day");
        }

        // Backwash
        if self.backwash.period_days < 2 {
            eyre::bail!("backwash.period_days must be >= 2");
        }
        if self.backwash.backwash_secs > 300 || self.backwash.rinse_secs > 300 {
            eyre::bail!("backwash durations must be <= 300 s");
        }

        // Heating
        if !(10.0..=32.0).contains(&self.heating.setpoint) {
            eyre::bail!("heating.setpoint must be in [10, 32]");
        }
        if self.heating.start_hour > 23 {
            eyre::bail!("heating.start_hour must be in [0, 23]");
        }
        if self.heating.hysteresis_down < 0.0
            || self.heating.hysteresis_up < 0.0
            || self.heating.hysteresis_min_temp < 0.0
        {
            eyre::bail!("heating hysteresis values must be >= 0");
        }
        if self.heater.hysteresis_down < 0.0 || self.heater.hysteresis_up < 0.0 {
            eyre::bail!("heater hysteresis values must be >= 0");
        }

        // Wintering
        if self.wintering.pump_speed == 0 || self.wintering.pump_speed > 3 {
            eyre::bail!("wintering.pump_speed must be in [1, 3]");
        }

        // Tank
        let t = &self.tank;
        if t.hysteresis < 0.0 {
            eyre::bail!("tank.hysteresis must be >= 0");
        }
        if t.eco_low >= t.eco_high || t.overflow_low >= t.overflow_high {
            eyre::bail!("tank low levels must be below the matching high levels");
        }
        if t.too_low >= t.eco_low || t.too_low >= t.overflow_low {
            eyre::bail!("tank.too_low must be below every low level");
        }

        // Disinfection
        let d = &self.disinfection;
        if d.security_duration_hours == 0 || d.security_duration_hours > 24 {
            eyre::bail!("disinfection.security_duration_hours must be in [1, 24]");
        }
        if d.ph_pwm_period_secs == 0 || d.cl_pwm_period_secs == 0 {
            eyre::bail!("disinfection pwm periods must be > 0");
        }
        if 2 * d.min_runtime_secs >= d.ph_pwm_period_secs.min(d.cl_pwm_period_secs) {
            eyre::bail!("disinfection.min_runtime_secs must be below half a pwm period");
        }
        if !(0.0..=1.0).contains(&d.constant_cl_duty) {
            eyre::bail!("disinfection.constant_cl_duty must be in [0.0, 1.0]");
        }
        if !(6.0..=8.0).contains(&d.ph_setpoint) {
            eyre::bail!("disinfection.ph_setpoint must be in [6, 8]");
        }
        if !(500.0..=800.0).contains(&d.orp_setpoint) {
            eyre::bail!("disinfection.orp_setpoint must be in [500, 800]");
        }
        if !(0.0..=10.0).contains(&d.ph_pterm) || !(0.0..=10.0).contains(&d.orp_pterm) {
            eyre::bail!("disinfection pterm values must be in [0, 10]");
        }

        // Swim
        if !(1..=60).contains(&self.swim.timer_minutes) {
            eyre::bail!("swim.timer_minutes must be in [1, 60]");
        }
        if !(1..=100).contains(&self.swim.speed) {
            eyre::bail!("swim.speed must be in [1, 100]");
        }

        // Sensors
        if self.sensors.sample_secs == 0 {
            eyre::bail!("sensors.sample_secs must be > 0");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }
        Ok(())
    }
}
