use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PoolError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for device")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
}

/// Failure of a bounded cross-actor query. Callers treat it as "not ready".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AskError {
    #[error("actor {0} did not answer in time")]
    Timeout(&'static str),
    #[error("actor {0} is gone")]
    Disconnected(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("state {0} is declared twice")]
    DuplicateState(String),
    #[error("unknown state {0}")]
    UnknownState(String),
    #[error("initial child {child} is not a child of {parent}")]
    InvalidInitial { parent: String, child: String },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Rejection of an inbound setting. The previous value stays in effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingError {
    #[error("unknown topic {0}")]
    UnknownTopic(String),
    #[error("payload for {topic} is not valid: {payload:?}")]
    Parse { topic: String, payload: String },
    #[error("value for {topic} out of range: {payload:?}")]
    OutOfRange { topic: String, payload: String },
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
