use crate::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct PlaybackMetrics {
    pub registry: Registry,
    pub occurrences_scheduled: IntCounter,
    pub commands_executed: IntCounter,
    pub device_failures: IntCounter,
    pub effects_cancelled: IntCounter,
    pub queue_depth: IntGauge,
}

impl PlaybackMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let occurrences_scheduled = IntCounter::new(
            "pulse_occurrences_scheduled",
            "Commands found in text and queued",
        )?;
        let commands_executed =
            IntCounter::new("pulse_commands_executed", "Commands handed to the device")?;
        let device_failures =
            IntCounter::new("pulse_device_failures", "Device commands that failed")?;
        let effects_cancelled = IntCounter::new(
            "pulse_effects_cancelled",
            "Running effects superseded or stopped",
        )?;
        let queue_depth = IntGauge::new("pulse_queue_depth", "Commands waiting to execute")?;

        registry.register(Box::new(occurrences_scheduled.clone()))?;
        registry.register(Box::new(commands_executed.clone()))?;
        registry.register(Box::new(device_failures.clone()))?;
        registry.register(Box::new(effects_cancelled.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            occurrences_scheduled,
            commands_executed,
            device_failures,
            effects_cancelled,
            queue_depth,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() -> anyhow::Result<()> {
        let m = PlaybackMetrics::new()?;
        m.commands_executed.inc();
        m.queue_depth.set(3);
        let text = m.encode_text();
        assert!(text.contains("pulse_commands_executed 1"));
        assert!(text.contains("pulse_queue_depth 3"));
        Ok(())
    }
}
