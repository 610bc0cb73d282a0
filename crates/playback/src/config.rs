use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Colors handed to the presentation layer for span highlighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightColors {
    /// Background for a detected command span.
    pub command: String,
    /// Color of the reading-progress indicator.
    pub progress: String,
}

impl Default for HighlightColors {
    fn default() -> Self {
        Self {
            command: "#ffd54f".to_string(),
            progress: "#90caf9".to_string(),
        }
    }
}

/// Runtime options, read at execution time so edits apply to the next
/// command without restarting playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Simulated reading speed in characters per second. Zero or less
    /// disables pacing.
    pub reading_speed_cps: f64,
    /// Maximum intensity (percent) per motor index; missing entries are 100.
    pub motor_caps: Vec<u32>,
    /// Replay the whole message once the queue drains.
    pub loop_enabled: bool,
    pub loop_interval_ms: u64,
    /// Trailing text longer than this to "read" is not animated.
    pub trailing_wait_cap_ms: u64,
    /// Spacing between per-motor calls of one multi-motor command.
    pub motor_call_spacing_ms: u64,
    pub frame_interval_ms: u64,
    pub poll_interval_ms: u64,
    /// Vibration (percent) sent when a device attaches; `null` disables it.
    pub initial_vibration: Option<u32>,
    pub highlight: HighlightColors,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            reading_speed_cps: 20.0,
            motor_caps: Vec::new(),
            loop_enabled: false,
            loop_interval_ms: 2000,
            trailing_wait_cap_ms: 5000,
            motor_call_spacing_ms: 50,
            frame_interval_ms: 50,
            poll_interval_ms: 250,
            initial_vibration: Some(50),
            highlight: HighlightColors::default(),
        }
    }
}

impl PlaybackConfig {
    /// Intensity cap for `motor` in percent.
    pub fn cap_for(&self, motor: usize) -> f64 {
        self.motor_caps
            .get(motor)
            .map_or(100.0, |cap| f64::from((*cap).min(100)))
    }

    /// Time a reader needs for `chars` characters.
    pub fn reading_delay(&self, chars: usize) -> Duration {
        if !self.reading_speed_cps.is_finite() || self.reading_speed_cps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(chars as f64 / self.reading_speed_cps)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn trailing_wait_cap(&self) -> Duration {
        Duration::from_millis(self.trailing_wait_cap_ms)
    }

    pub fn motor_call_spacing(&self) -> Duration {
        Duration::from_millis(self.motor_call_spacing_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("encoding playback config")
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<PlaybackConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg: PlaybackConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    Ok(cfg)
}
