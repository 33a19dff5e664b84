//! Device collaborator contract consumed by the pool controller.
//!
//! Every actuator and sensor is reached through these traits; drivers for real
//! GPIO, DAC or serial hardware live outside this workspace.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error type used at the device trait boundary.
pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;

/// On/off actuator (valve, relay, single-speed pump).
pub trait Switch: Send {
    fn on(&mut self) -> Result<(), DeviceError>;
    fn off(&mut self) -> Result<(), DeviceError>;
}

/// Variable-speed pump. Speed 0 means stopped.
pub trait SpeedPump: Send {
    fn speed(&mut self, value: u8) -> Result<(), DeviceError>;
    /// Highest accepted speed value.
    fn max_speed(&self) -> u8;

    fn off(&mut self) -> Result<(), DeviceError> {
        self.speed(0)
    }
}

/// Read-only analog sensor (level, pH, ORP, temperature).
pub trait Sensor: Send {
    fn read(&mut self) -> Result<f64, DeviceError>;
}

/// Motorized pool cover driven by the serial microcontroller.
pub trait Cover: Send {
    fn open(&mut self) -> Result<(), DeviceError>;
    fn close(&mut self) -> Result<(), DeviceError>;
    fn stop(&mut self) -> Result<(), DeviceError>;
    /// Position in percent, 0 = closed, 100 = open.
    fn position(&mut self) -> Result<u8, DeviceError>;
}

/// Pulse counter of the fresh water meter.
pub trait WaterMeter: Send {
    fn counter(&mut self) -> Result<u64, DeviceError>;
}
