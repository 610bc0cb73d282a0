use crate::{Capabilities, DeviceEvent, DeviceInfo, Result, TransportError};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A single connected actuator. All commands are asynchronous and may fail.
#[async_trait]
pub trait Device: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    fn capabilities(&self) -> Capabilities;

    /// Set one vibration motor to `speed` in `[0, 1]`.
    async fn vibrate(&self, motor: usize, speed: f64) -> Result<()>;

    /// Set the oscillation channel to `speed` in `[0, 1]`.
    async fn oscillate(&self, _speed: f64) -> Result<()> {
        Err(TransportError::Unsupported("oscillate"))
    }

    /// Move the linear actuator to `position` in `[0, 1]` over `duration_ms`.
    async fn linear(&self, _position: f64, _duration_ms: u64) -> Result<()> {
        Err(TransportError::Unsupported("linear"))
    }

    fn name(&self) -> &str {
        &self.info().name
    }
}

/// Connection-level client: owns the link to the device server and
/// announces devices as they appear and disappear.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn start_scanning(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Subscribe to device added/removed notifications.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}
