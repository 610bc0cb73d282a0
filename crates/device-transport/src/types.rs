use core::fmt;

/// What a connected device can do. Absent capabilities are not errors.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
    /// Number of independently addressable vibration motors.
    pub vibrate_motors: usize,
    pub oscillate: bool,
    pub linear: bool,
}

impl Capabilities {
    pub fn vibrate_only(motors: usize) -> Self {
        Self {
            vibrate_motors: motors,
            ..Self::default()
        }
    }

    pub fn can_vibrate(&self) -> bool {
        self.vibrate_motors > 0
    }
}

/// Identity of a device as announced by the client.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.index)
    }
}

/// Clamp a caller-supplied fraction into the `[0, 1]` range devices accept.
pub fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Notifications emitted by a [`DeviceClient`](crate::DeviceClient).
#[derive(Clone)]
pub enum DeviceEvent {
    Added(std::sync::Arc<dyn crate::Device>),
    Removed(DeviceInfo),
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(device) => f.debug_tuple("Added").field(device.info()).finish(),
            Self::Removed(info) => f.debug_tuple("Removed").field(info).finish(),
        }
    }
}
