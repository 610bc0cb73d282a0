use crate::{
    clamp_fraction, Capabilities, Device, DeviceClient, DeviceEvent, DeviceInfo, Result,
    TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// One command received by a [`MockDevice`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MockCommand {
    Vibrate { motor: usize, speed: f64 },
    Oscillate { speed: f64 },
    Linear { position: f64, duration_ms: u64 },
}

#[derive(Clone, Debug)]
pub struct MockCall {
    pub at: Instant,
    pub command: MockCommand,
    pub ok: bool,
}

/// An in-process device that records every command it receives.
pub struct MockDevice {
    info: DeviceInfo,
    caps: Capabilities,
    latency: Duration,
    calls: Mutex<Vec<MockCall>>,
    /// Commands still to fail before the device behaves again.
    failures: Mutex<usize>,
}

impl MockDevice {
    pub fn new(index: u32, name: &str, caps: Capabilities) -> Self {
        Self {
            info: DeviceInfo {
                index,
                name: name.to_string(),
            },
            caps,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(0),
        }
    }

    /// A device with every capability, handy for demos.
    pub fn full(index: u32, name: &str, motors: usize) -> Self {
        Self::new(
            index,
            name,
            Capabilities {
                vibrate_motors: motors,
                oscillate: true,
                linear: true,
            },
        )
    }

    /// Simulated round-trip time applied to every command.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` commands fail.
    pub fn fail_next(&self, count: usize) {
        *self.failures.lock() = count;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn commands(&self) -> Vec<MockCommand> {
        self.calls.lock().iter().map(|c| c.command).collect()
    }

    async fn record(&self, command: MockCommand) -> Result<()> {
        let ok = {
            let mut left = self.failures.lock();
            if *left > 0 {
                *left -= 1;
                false
            } else {
                true
            }
        };
        self.calls.lock().push(MockCall {
            at: Instant::now(),
            command,
            ok,
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if ok {
            tracing::trace!(device = %self.info, ?command, "mock command");
            Ok(())
        } else {
            Err(TransportError::Command(format!(
                "injected failure on {}",
                self.info.name
            )))
        }
    }
}

#[async_trait]
impl Device for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn vibrate(&self, motor: usize, speed: f64) -> Result<()> {
        if motor >= self.caps.vibrate_motors {
            return Err(TransportError::MotorOutOfRange {
                index: motor,
                count: self.caps.vibrate_motors,
            });
        }
        self.record(MockCommand::Vibrate {
            motor,
            speed: clamp_fraction(speed),
        })
        .await
    }

    async fn oscillate(&self, speed: f64) -> Result<()> {
        if !self.caps.oscillate {
            return Err(TransportError::Unsupported("oscillate"));
        }
        self.record(MockCommand::Oscillate {
            speed: clamp_fraction(speed),
        })
        .await
    }

    async fn linear(&self, position: f64, duration_ms: u64) -> Result<()> {
        if !self.caps.linear {
            return Err(TransportError::Unsupported("linear"));
        }
        self.record(MockCommand::Linear {
            position: clamp_fraction(position),
            duration_ms,
        })
        .await
    }
}

/// A client that "finds" a fixed set of mock devices when scanning.
pub struct MockClient {
    connected: AtomicBool,
    devices: Vec<Arc<MockDevice>>,
    events: broadcast::Sender<DeviceEvent>,
}

impl MockClient {
    pub fn new(devices: Vec<Arc<MockDevice>>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            connected: AtomicBool::new(false),
            devices,
            events,
        }
    }

    /// Announce that a device went away, as a real server would on unplug.
    pub fn remove_device(&self, index: u32) {
        if let Some(dev) = self.devices.iter().find(|d| d.info().index == index) {
            let _ = self.events.send(DeviceEvent::Removed(dev.info().clone()));
        }
    }
}

#[async_trait]
impl DeviceClient for MockClient {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            for dev in &self.devices {
                let _ = self.events.send(DeviceEvent::Removed(dev.info().clone()));
            }
        }
        Ok(())
    }

    async fn start_scanning(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        for dev in &self.devices {
            let device: Arc<dyn Device> = dev.clone();
            // No subscribers yet is fine; scanning may be repeated.
            let _ = self.events.send(DeviceEvent::Added(device));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_injected_failures() -> anyhow::Result<()> {
        let dev = MockDevice::new(0, "mock", Capabilities::vibrate_only(2));
        dev.vibrate(0, 0.5).await?;
        dev.fail_next(1);
        assert!(dev.vibrate(1, 0.25).await.is_err());
        dev.vibrate(1, 1.5).await?;

        let calls = dev.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls[1].ok);
        assert_eq!(
            calls[2].command,
            MockCommand::Vibrate {
                motor: 1,
                speed: 1.0
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_capabilities_report_unsupported() {
        let dev = MockDevice::new(0, "vibe", Capabilities::vibrate_only(1));
        let err = dev.oscillate(0.5).await.unwrap_err();
        assert!(err.is_unsupported());
        let err = dev.vibrate(3, 0.5).await.unwrap_err();
        assert!(err.is_unsupported());
        assert!(dev.calls().is_empty());
    }

    #[tokio::test]
    async fn scanning_announces_devices() -> anyhow::Result<()> {
        let dev = Arc::new(MockDevice::full(7, "stroker", 1));
        let client = MockClient::new(vec![dev]);
        let mut rx = client.subscribe();

        assert_eq!(
            client.start_scanning().await,
            Err(TransportError::NotConnected)
        );
        client.connect().await?;
        client.start_scanning().await?;
        match rx.recv().await? {
            DeviceEvent::Added(d) => assert_eq!(d.info().index, 7),
            other => panic!("unexpected event {other:?}"),
        }

        client.disconnect().await?;
        assert!(matches!(rx.recv().await?, DeviceEvent::Removed(_)));
        assert!(!client.is_connected());
        Ok(())
    }
}
