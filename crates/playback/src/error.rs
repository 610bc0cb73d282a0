use command_scanner::ScanError;
use device_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = PlaybackError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no device attached")]
    NoDevice,
    #[error(transparent)]
    Device(#[from] TransportError),
    #[error("scanner init error: {0}")]
    Scanner(#[from] ScanError),
    #[error("metrics init error: {0}")]
    Metrics(#[from] prometheus::Error),
}
