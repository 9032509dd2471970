use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("switch error: {0}")]
    Switch(String),
    #[error("hardware timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
