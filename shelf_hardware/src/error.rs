use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("timeout")]
    Timeout,
    #[error("no ranging channel {0}")]
    NoChannel(usize),
    #[error("broker session error: {0}")]
    Session(String),
    #[error("not connected")]
    NotConnected,
    #[error("name lookup failed: {0}")]
    Lookup(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
