//! Simulated pool devices.
//!
//! Each device hands out a cloneable probe sharing its internal state so that a
//! test or the simulation front-end can observe actuators and drive sensors
//! while the owning actor holds the device itself.
pub mod error;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pool_traits::{Cover, DeviceError, Sensor, SpeedPump, Switch, WaterMeter};

use crate::error::HwError;

/// Simulated relay or valve.
#[derive(Debug)]
pub struct SimSwitch {
    name: &'static str,
    state: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
}

/// Observer side of a [`SimSwitch`].
#[derive(Debug, Clone)]
pub struct SwitchProbe {
    state: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
}

impl SimSwitch {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(AtomicBool::new(false)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn probe(&self) -> SwitchProbe {
        SwitchProbe {
            state: Arc::clone(&self.state),
            fail: Arc::clone(&self.fail),
        }
    }

    fn set(&self, on: bool) -> Result<(), DeviceError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Gpio(format!("{} stuck", self.name))));
        }
        self.state.store(on, Ordering::Relaxed);
        tracing::trace!(device = self.name, on, "switch (simulated)");
        Ok(())
    }
}

impl SwitchProbe {
    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }

    /// Make every following command on the switch fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl Switch for SimSwitch {
    fn on(&mut self) -> Result<(), DeviceError> {
        self.set(true)
    }

    fn off(&mut self) -> Result<(), DeviceError> {
        self.set(false)
    }
}

/// Simulated variable-speed pump.
#[derive(Debug)]
pub struct SimPump {
    name: &'static str,
    max: u8,
    speed: Arc<AtomicU8>,
}

#[derive(Debug, Clone)]
pub struct PumpProbe {
    speed: Arc<AtomicU8>,
}

impl SimPump {
    pub fn new(name: &'static str, max: u8) -> Self {
        Self {
            name,
            max,
            speed: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn probe(&self) -> PumpProbe {
        PumpProbe {
            speed: Arc::clone(&self.speed),
        }
    }
}

impl PumpProbe {
    pub fn speed(&self) -> u8 {
        self.speed.load(Ordering::Relaxed)
    }
}

impl SpeedPump for SimPump {
    fn speed(&mut self, value: u8) -> Result<(), DeviceError> {
        if value > self.max {
            return Err(Box::new(HwError::SpeedOutOfRange {
                requested: value,
                max: self.max,
            }));
        }
        self.speed.store(value, Ordering::Relaxed);
        tracing::trace!(device = self.name, speed = value, "pump (simulated)");
        Ok(())
    }

    fn max_speed(&self) -> u8 {
        self.max
    }
}

/// Simulated analog sensor with a settable value. `None` reads as a device fault.
#[derive(Debug)]
pub struct SimSensor {
    name: &'static str,
    value: Arc<Mutex<Option<f64>>>,
}

#[derive(Debug, Clone)]
pub struct SensorProbe {
    value: Arc<Mutex<Option<f64>>>,
}

impl SimSensor {
    pub fn new(name: &'static str, initial: f64) -> Self {
        Self {
            name,
            value: Arc::new(Mutex::new(Some(initial))),
        }
    }

    pub fn probe(&self) -> SensorProbe {
        SensorProbe {
            value: Arc::clone(&self.value),
        }
    }
}

impl SensorProbe {
    pub fn set(&self, value: Option<f64>) {
        if let Ok(mut v) = self.value.lock() {
            *v = value;
        }
    }
}

impl Sensor for SimSensor {
    fn read(&mut self) -> Result<f64, DeviceError> {
        let value = self.value.lock().map(|v| *v).unwrap_or(None);
        value.ok_or_else(|| Box::new(HwError::NoReading(self.name)) as DeviceError)
    }
}

const COVER_STEP: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Stopped,
    Opening,
    Closing,
}

/// Simulated cover: every position poll moves it one step in the commanded direction.
#[derive(Debug)]
pub struct SimCover {
    position: Arc<AtomicU8>,
    motion: Motion,
}

#[derive(Debug, Clone)]
pub struct CoverProbe {
    position: Arc<AtomicU8>,
}

impl SimCover {
    pub fn new(position: u8) -> Self {
        Self {
            position: Arc::new(AtomicU8::new(position.min(100))),
            motion: Motion::Stopped,
        }
    }

    pub fn probe(&self) -> CoverProbe {
        CoverProbe {
            position: Arc::clone(&self.position),
        }
    }
}

impl CoverProbe {
    pub fn position(&self) -> u8 {
        self.position.load(Ordering::Relaxed)
    }
}

impl Cover for SimCover {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.motion = Motion::Opening;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.motion = Motion::Closing;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.motion = Motion::Stopped;
        Ok(())
    }

    fn position(&mut self) -> Result<u8, DeviceError> {
        let current = self.position.load(Ordering::Relaxed);
        let next = match self.motion {
            Motion::Stopped => current,
            Motion::Opening => current.saturating_add(COVER_STEP).min(100),
            Motion::Closing => current.saturating_sub(COVER_STEP),
        };
        self.position.store(next, Ordering::Relaxed);
        Ok(next)
    }
}

/// Simulated water meter advancing by a fixed number of pulses per read.
#[derive(Debug)]
pub struct SimWaterMeter {
    counter: Arc<AtomicU64>,
    pulses_per_read: u64,
}

impl SimWaterMeter {
    pub fn new(pulses_per_read: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            pulses_per_read,
        }
    }
}

impl WaterMeter for SimWaterMeter {
    fn counter(&mut self) -> Result<u64, DeviceError> {
        Ok(self
            .counter
            .fetch_add(self.pulses_per_read, Ordering::Relaxed)
            + self.pulses_per_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn switch_probe_tracks_state() {
        let mut sw = SimSwitch::new("gravity");
        let probe = sw.probe();
        sw.on().unwrap();
        assert!(probe.is_on());
        sw.off().unwrap();
        assert!(!probe.is_on());
    }

    #[test]
    fn failing_switch_reports_gpio_error() {
        let mut sw = SimSwitch::new("drain");
        sw.probe().set_failing(true);
        let err = sw.on().unwrap_err();
        assert!(err.downcast_ref::<HwError>().is_some());
    }

    #[rstest]
    #[case(0, true)]
    #[case(3, true)]
    #[case(4, false)]
    fn pump_rejects_speed_above_max(#[case] speed: u8, #[case] ok: bool) {
        let mut pump = SimPump::new("variable", 3);
        assert_eq!(pump.speed(speed).is_ok(), ok);
    }

    #[test]
    fn sensor_without_value_is_an_error() {
        let mut s = SimSensor::new("tank", 42.0);
        assert_eq!(s.read().unwrap(), 42.0);
        s.probe().set(None);
        assert!(s.read().is_err());
    }

    #[test]
    fn cover_reaches_fully_open_after_four_polls() {
        let mut cover = SimCover::new(0);
        cover.open().unwrap();
        let positions: Vec<u8> = (0..5).map(|_| cover.position().unwrap()).collect();
        assert_eq!(positions, vec![25, 50, 75, 100, 100]);
        cover.close().unwrap();
        assert_eq!(cover.position().unwrap(), 75);
        cover.stop().unwrap();
        assert_eq!(cover.position().unwrap(), 75);
    }

    #[test]
    fn water_meter_counts_up() {
        let mut meter = SimWaterMeter::new(3);
        assert_eq!(meter.counter().unwrap(), 3);
        assert_eq!(meter.counter().unwrap(), 6);
    }
}
