//! device-transport: haptic device abstractions
//!
//! This crate provides the traits and types the playback engine uses to talk to
//! vibration, oscillation and linear-motion devices, with feature-gated backends.
//! The default build enables a `mock` backend so that binaries and tests run on any
//! host without a device server.

mod types;
pub use types::{clamp_fraction, Capabilities, DeviceEvent, DeviceInfo};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{Device, DeviceClient};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCall, MockClient, MockCommand, MockDevice};
