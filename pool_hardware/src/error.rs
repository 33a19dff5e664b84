use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("device timeout")]
    Timeout,
    #[error("sensor {0} has no reading")]
    NoReading(&'static str),
    #[error("speed {requested} above maximum {max}")]
    SpeedOutOfRange { requested: u8, max: u8 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
