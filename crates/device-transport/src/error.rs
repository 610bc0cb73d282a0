use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("operation not supported by this device: {0}")]
    Unsupported(&'static str),
    #[error("motor index {index} out of range (device has {count})")]
    MotorOutOfRange { index: usize, count: usize },
    #[error("device command failed: {0}")]
    Command(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Capability gaps are expected on heterogeneous hardware and callers
    /// treat them as no-ops rather than failures.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::MotorOutOfRange { .. })
    }
}
