use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BmsError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("engine stopped")]
    Stopped,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing hardware")]
    MissingHardware,
    #[error("missing charger")]
    MissingCharger,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
