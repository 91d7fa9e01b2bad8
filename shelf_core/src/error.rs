use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("no configured network could be joined ({tried} tried)")]
    AssociationFailed { tried: usize },
    #[error("broker connect failed: {0}")]
    BrokerConnect(String),
    #[error("unknown slot: {0}")]
    UnknownSlot(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Why a calibration run produced no reference length.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("unknown slot: {0}")]
    UnknownSlot(String),
    #[error("insufficient valid samples: {valid} valid, {required} required")]
    InsufficientSamples { valid: u32, required: u32 },
    #[error("could not persist reference length: {0}")]
    Persist(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing ranger")]
    MissingRanger,
    #[error("missing wifi radio")]
    MissingRadio,
    #[error("missing transport")]
    MissingTransport,
    #[error("missing resolver")]
    MissingResolver,
    #[error("missing key/value store")]
    MissingStore,
    #[error("missing device identity")]
    MissingIdentity,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
