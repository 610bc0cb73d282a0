//! Turns occurrences into device calls and autonomous effects

use crate::{
    DisplayValue, EffectSlot, PlaybackConfig, PlaybackError, PlaybackMetrics, PresentationSink,
    Result, StrokeMachine,
};
use command_scanner::{
    Command, LinearPatternSpec, LinearSpec, LinearSpeedSpec, Levels, Occurrence, PatternSpec,
};
use device_transport::{Device, TransportError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, warn};

/// Shortest wait an effect ever takes between steps.
const MIN_STEP: Duration = Duration::from_millis(10);

fn step_wait(ms: u64) -> Duration {
    Duration::from_millis(ms).max(MIN_STEP)
}

fn percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

fn first_level(levels: Levels<'_>) -> f64 {
    match levels {
        Levels::All(v) => v,
        Levels::PerMotor(values) => values.first().copied().unwrap_or(0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Vibrate,
    Oscillate,
}

/// Everything an effect task needs to drive the device on its own.
#[derive(Clone)]
struct Actuator {
    device: Arc<dyn Device>,
    sink: Arc<dyn PresentationSink>,
    config: Arc<RwLock<PlaybackConfig>>,
    metrics: PlaybackMetrics,
}

impl Actuator {
    /// Drive the vibration motors in index order, spacing consecutive
    /// calls. Returns the percentage sent to the first motor.
    async fn vibrate(&self, levels: Levels<'_>) -> Result<Option<f64>, TransportError> {
        let motors = self.device.capabilities().vibrate_motors;
        let (spacing, caps): (Duration, Vec<f64>) = {
            let cfg = self.config.read();
            (
                cfg.motor_call_spacing(),
                (0..motors).map(|m| cfg.cap_for(m)).collect(),
            )
        };

        let mut shown = None;
        for (motor, cap) in caps.into_iter().enumerate() {
            let value = match levels {
                Levels::All(v) => v,
                Levels::PerMotor(values) => match values.get(motor) {
                    Some(v) => *v,
                    None => break,
                },
            };
            if motor > 0 && !spacing.is_zero() {
                sleep(spacing).await;
            }
            let level = percent(value).min(cap);
            match self.device.vibrate(motor, level / 100.0).await {
                Ok(()) => {}
                Err(e) if e.is_unsupported() => {
                    debug!(device = self.device.name(), motor, "vibrate unsupported");
                }
                Err(e) => return Err(e),
            }
            shown.get_or_insert(level);
        }
        if let Some(level) = shown {
            self.sink.display(DisplayValue::Vibrate(level.round() as u32));
        }
        Ok(shown)
    }

    async fn oscillate(&self, value: f64) -> Result<(), TransportError> {
        if !self.device.capabilities().oscillate {
            return Ok(());
        }
        let level = percent(value).min(self.config.read().cap_for(0));
        match self.device.oscillate(level / 100.0).await {
            Err(e) if e.is_unsupported() => Ok(()),
            Err(e) => Err(e),
            Ok(()) => {
                self.sink.display(DisplayValue::Oscillate(level.round() as u32));
                Ok(())
            }
        }
    }

    async fn linear(&self, position: u32, duration_ms: u64) -> Result<(), TransportError> {
        if !self.device.capabilities().linear {
            return Ok(());
        }
        let target = percent(f64::from(position)) / 100.0;
        match self.device.linear(target, duration_ms).await {
            Err(e) if e.is_unsupported() => Ok(()),
            other => other,
        }
    }

    fn report_failure(&self, action: &str, err: &TransportError) {
        let name = self.device.name();
        self.metrics.device_failures.inc();
        warn!(device = name, error = %err, "{action} command failed");
        self.sink.status(&format!("{action} command failed for {name}"));
    }

    async fn vibrate_once(&self, levels: Levels<'_>) -> Result<(), TransportError> {
        match self.vibrate(levels).await {
            Ok(shown) => {
                if let Some(level) = shown {
                    self.sink
                        .status(&format!("Vibrating at {}%", level.round() as u32));
                }
                Ok(())
            }
            Err(e) => {
                self.report_failure("Vibrate", &e);
                Err(e)
            }
        }
    }

    async fn stop_motors(&self, channel: Channel) {
        let result = match channel {
            Channel::Vibrate => self.vibrate(Levels::All(0.0)).await.map(|_| ()),
            Channel::Oscillate => self.oscillate(0.0).await,
        };
        if let Err(e) = result {
            warn!(device = self.device.name(), error = %e, "failed to stop motors");
        }
    }

    async fn run_pattern(self, spec: PatternSpec, channel: Channel) {
        let steps = spec.pattern.len().max(1);
        let limit = spec.loops.map(|n| steps.saturating_mul(n as usize));
        let mut step = 0usize;
        loop {
            if limit.is_some_and(|limit| step >= limit) {
                self.stop_motors(channel).await;
                self.sink.display(DisplayValue::Interval(None));
                debug!(?channel, passes = ?spec.loops, "pattern finished");
                return;
            }
            let levels = spec.pattern.levels(step);
            let interval = spec.interval.at(step);
            self.sink.display(DisplayValue::Interval(Some(interval)));

            match channel {
                Channel::Vibrate => match self.vibrate(levels).await {
                    Ok(shown) => {
                        if let Some(level) = shown {
                            self.sink.status(&format!(
                                "Vibrating at {}% (Pattern)",
                                level.round() as u32
                            ));
                        }
                    }
                    Err(e) => {
                        self.report_failure("Vibrate", &e);
                        self.sink.display(DisplayValue::Interval(None));
                        return;
                    }
                },
                Channel::Oscillate => {
                    if let Err(e) = self.oscillate(first_level(levels)).await {
                        debug!(device = self.device.name(), error = %e, "oscillate step failed");
                    }
                }
            }

            sleep(step_wait(interval)).await;
            step += 1;
        }
    }

    async fn run_linear(self, spec: LinearSpec) {
        self.sink.display(DisplayValue::Position {
            start: spec.start_position,
            end: spec.end_position,
        });
        self.sink.display(DisplayValue::StrokeDuration(spec.duration));
        self.sink
            .status(&format!("Stroking. Duration: {}ms", spec.duration));

        let mut ticker = tokio::time::interval(step_wait(spec.duration));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut toward_end = true;
        loop {
            ticker.tick().await;
            let target = if toward_end {
                spec.end_position
            } else {
                spec.start_position
            };
            if let Err(e) = self.linear(target, spec.duration).await {
                self.report_failure("Linear", &e);
                return;
            }
            toward_end = !toward_end;
        }
    }

    async fn run_speed_ramp(self, spec: LinearSpeedSpec) {
        self.sink.display(DisplayValue::Position {
            start: spec.start_position,
            end: spec.end_position,
        });
        let mut step = 0u32;
        let mut toward_end = true;
        loop {
            let duration = spec.duration_at(step);
            let target = if toward_end {
                spec.end_position
            } else {
                spec.start_position
            };
            if let Err(e) = self.linear(target, duration).await {
                self.report_failure("Linear", &e);
                return;
            }
            self.sink.display(DisplayValue::StrokeDuration(duration));
            sleep(step_wait(duration)).await;
            toward_end = !toward_end;
            step = (step + 1) % spec.steps.max(1);
        }
    }

    async fn run_linear_pattern(self, spec: LinearPatternSpec) {
        let mut machine = StrokeMachine::new(spec);
        while let Some(stroke) = machine.next_stroke() {
            match self.linear(stroke.position, stroke.duration_ms).await {
                Ok(()) => {
                    self.sink.display(DisplayValue::StrokeDuration(stroke.duration_ms));
                    sleep(step_wait(stroke.duration_ms)).await;
                }
                Err(e) => {
                    self.report_failure("Linear", &e);
                    sleep(StrokeMachine::RECOVERY_PAUSE).await;
                    machine.abandon_segment();
                }
            }
        }
        debug!("linear pattern finished");
    }
}

/// Executes commands against the attached device. Only the executor ever
/// talks to the device, and it keeps at most one effect running.
pub struct Executor {
    device: RwLock<Option<Arc<dyn Device>>>,
    config: Arc<RwLock<PlaybackConfig>>,
    sink: Arc<dyn PresentationSink>,
    effects: EffectSlot,
    metrics: PlaybackMetrics,
}

impl Executor {
    pub fn new(
        config: Arc<RwLock<PlaybackConfig>>,
        sink: Arc<dyn PresentationSink>,
        metrics: PlaybackMetrics,
    ) -> Self {
        Self {
            device: RwLock::new(None),
            config,
            sink,
            effects: EffectSlot::new(metrics.clone()),
            metrics,
        }
    }

    pub fn set_device(&self, device: Arc<dyn Device>) {
        *self.device.write() = Some(device);
    }

    /// Forget the attached device, stopping its effect first.
    pub fn clear_device(&self) -> Option<Arc<dyn Device>> {
        self.effects.cancel();
        self.device.write().take()
    }

    pub fn device(&self) -> Option<Arc<dyn Device>> {
        self.device.read().clone()
    }

    pub fn has_device(&self) -> bool {
        self.device.read().is_some()
    }

    /// Stop the running effect, if any. Returns `true` if one was running.
    pub fn cancel_effect(&self) -> bool {
        self.effects.cancel()
    }

    /// Label of the running effect, if any.
    pub fn active_effect(&self) -> Option<&'static str> {
        self.effects.current()
    }

    fn actuator(&self) -> Result<Actuator> {
        let device = self.device().ok_or(PlaybackError::NoDevice)?;
        Ok(Actuator {
            device,
            sink: self.sink.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        })
    }

    /// Execute one occurrence. Any running effect is cancelled first.
    pub async fn execute(&self, occurrence: &Occurrence) -> Result<()> {
        debug!(
            kind = %occurrence.kind(),
            start = occurrence.start,
            raw = %occurrence.raw,
            "executing occurrence"
        );
        self.execute_command(&occurrence.command).await
    }

    /// Execute a bare command with the same one-effect rule as occurrences.
    pub async fn execute_command(&self, command: &Command) -> Result<()> {
        self.effects.cancel();
        let actuator = self.actuator()?;
        let caps = actuator.device.capabilities();
        self.metrics.commands_executed.inc();

        match command {
            Command::VibrateSingle(level) => {
                actuator.vibrate_once(Levels::All(f64::from(*level))).await?;
            }
            Command::VibrateArray(levels) => {
                actuator.vibrate_once(Levels::PerMotor(levels)).await?;
            }
            Command::VibrateMulti(spec) => {
                if caps.can_vibrate() {
                    self.effects.install(
                        "vibrate-pattern",
                        actuator.run_pattern(spec.clone(), Channel::Vibrate),
                    );
                }
            }
            Command::OscillateSingle(level) => {
                if let Err(e) = actuator.oscillate(f64::from(*level)).await {
                    debug!(device = actuator.device.name(), error = %e, "oscillate failed");
                }
            }
            Command::OscillateMulti(spec) => {
                if caps.oscillate {
                    self.effects.install(
                        "oscillate-pattern",
                        actuator.run_pattern(spec.clone(), Channel::Oscillate),
                    );
                }
            }
            Command::Linear(spec) => {
                if caps.linear {
                    self.effects.install("linear", actuator.run_linear(*spec));
                }
            }
            Command::LinearSpeed(spec) => {
                if caps.linear {
                    self.effects
                        .install("linear-speed", actuator.run_speed_ramp(*spec));
                }
            }
            Command::LinearPattern(spec) => {
                if caps.linear {
                    self.effects
                        .install("linear-pattern", actuator.run_linear_pattern(spec.clone()));
                }
            }
        }
        Ok(())
    }

    /// Set every vibration motor to `level` percent.
    pub async fn manual_vibrate(&self, level: u32) -> Result<()> {
        self.execute_command(&Command::VibrateSingle(level)).await
    }

    /// Start stroking between two positions.
    pub async fn manual_stroke(&self, start: u32, end: u32, duration_ms: u64) -> Result<()> {
        self.execute_command(&Command::Linear(LinearSpec {
            start_position: start,
            end_position: end,
            duration: duration_ms,
        }))
        .await
    }

    /// Cancel the running effect and bring every output to rest.
    pub async fn stop_all(&self) -> Result<()> {
        self.effects.cancel();
        let actuator = self.actuator()?;
        let caps = actuator.device.capabilities();
        if caps.can_vibrate() {
            actuator.vibrate_once(Levels::All(0.0)).await?;
        }
        if caps.oscillate {
            actuator.oscillate(0.0).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingSink;
    use device_transport::{Capabilities, MockCommand, MockDevice};

    struct Rig {
        executor: Executor,
        device: Arc<MockDevice>,
        sink: Arc<RecordingSink>,
        metrics: PlaybackMetrics,
    }

    fn rig(device: MockDevice, config: PlaybackConfig) -> anyhow::Result<Rig> {
        let metrics = PlaybackMetrics::new()?;
        let sink = Arc::new(RecordingSink::new());
        let executor = Executor::new(
            Arc::new(RwLock::new(config)),
            sink.clone(),
            metrics.clone(),
        );
        let device = Arc::new(device);
        executor.set_device(device.clone());
        Ok(Rig {
            executor,
            device,
            sink,
            metrics,
        })
    }

    fn occurrence(text: &str) -> anyhow::Result<Occurrence> {
        command_scanner::scan(text)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("nothing scanned in {text}"))
    }

    #[tokio::test(start_paused = true)]
    async fn single_vibrate_hits_every_motor_in_order_with_caps() -> anyhow::Result<()> {
        let config = PlaybackConfig {
            motor_caps: vec![100, 30],
            ..PlaybackConfig::default()
        };
        let r = rig(MockDevice::new(0, "duo", Capabilities::vibrate_only(2)), config)?;
        let start = tokio::time::Instant::now();
        r.executor.execute(&occurrence(r#""VIBRATE": 50"#)?).await?;

        let calls = r.device.calls();
        assert_eq!(
            calls.iter().map(|c| c.command).collect::<Vec<_>>(),
            vec![
                MockCommand::Vibrate { motor: 0, speed: 0.5 },
                MockCommand::Vibrate { motor: 1, speed: 0.3 },
            ]
        );
        assert_eq!(calls[1].at - start, Duration::from_millis(50));
        assert_eq!(r.sink.last_status().as_deref(), Some("Vibrating at 50%"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn vibrate_array_leaves_missing_motors_untouched() -> anyhow::Result<()> {
        let r = rig(
            MockDevice::new(0, "trio", Capabilities::vibrate_only(3)),
            PlaybackConfig::default(),
        )?;
        r.executor.execute(&occurrence(r#""VIBRATE": [20, 140]"#)?).await?;
        assert_eq!(
            r.device.commands(),
            vec![
                MockCommand::Vibrate { motor: 0, speed: 0.2 },
                MockCommand::Vibrate { motor: 1, speed: 1.0 },
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn missing_capabilities_are_silent() -> anyhow::Result<()> {
        let r = rig(
            MockDevice::new(0, "buzz", Capabilities::vibrate_only(1)),
            PlaybackConfig::default(),
        )?;
        r.executor
            .execute(&occurrence(r#""LINEAR": {"start_position":10,"end_position":90,"duration":1000}"#)?)
            .await?;
        r.executor.execute(&occurrence(r#""OSCILLATE": 40"#)?).await?;
        assert!(r.device.calls().is_empty());
        assert_eq!(r.executor.active_effect(), None);
        assert_eq!(r.metrics.device_failures.get(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reports_status_and_is_counted() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "flaky", 1), PlaybackConfig::default())?;
        r.device.fail_next(1);
        let result = r.executor.execute(&occurrence(r#""VIBRATE": 70"#)?).await;
        assert!(matches!(result, Err(PlaybackError::Device(_))));
        assert_eq!(
            r.sink.last_status().as_deref(),
            Some("Vibrate command failed for flaky")
        );
        assert_eq!(r.metrics.device_failures.get(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn no_device_is_an_error() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "gone", 1), PlaybackConfig::default())?;
        r.executor.clear_device();
        let result = r.executor.execute(&occurrence(r#""VIBRATE": 10"#)?).await;
        assert!(matches!(result, Err(PlaybackError::NoDevice)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn finite_pattern_stops_motors_after_its_passes() -> anyhow::Result<()> {
        let r = rig(
            MockDevice::new(0, "buzz", Capabilities::vibrate_only(1)),
            PlaybackConfig::default(),
        )?;
        r.executor
            .execute(&occurrence(
                r#""VIBRATE": {"pattern": [20, 80], "interval": [100, 300], "loop": 2}"#,
            )?)
            .await?;
        assert_eq!(r.executor.active_effect(), Some("vibrate-pattern"));
        sleep(Duration::from_millis(2000)).await;

        let speeds: Vec<f64> = r
            .device
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                MockCommand::Vibrate { speed, .. } => Some(speed),
                _ => None,
            })
            .collect();
        assert_eq!(speeds, vec![0.2, 0.8, 0.2, 0.8, 0.0]);
        assert_eq!(r.executor.active_effect(), None);
        assert!(r.sink.displays().contains(&DisplayValue::Interval(Some(300))));
        assert_eq!(r.sink.displays().last(), Some(&DisplayValue::Interval(None)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn linear_alternates_from_end_position() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "stroker", 0), PlaybackConfig::default())?;
        r.executor
            .execute(&occurrence(
                r#""LINEAR": {"start_position": 10, "end_position": 90, "duration": 1000}"#,
            )?)
            .await?;
        sleep(Duration::from_millis(2500)).await;

        let positions: Vec<f64> = r
            .device
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                MockCommand::Linear { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![0.9, 0.1, 0.9]);
        assert_eq!(
            r.sink.statuses().first().map(String::as_str),
            Some("Stroking. Duration: 1000ms")
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn speed_ramp_interpolates_durations() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "stroker", 0), PlaybackConfig::default())?;
        r.executor
            .execute(&occurrence(
                r#""LINEAR_SPEED": {"start_position": 10, "end_position": 90, "start_duration": 1000, "end_duration": 200, "steps": 5}"#,
            )?)
            .await?;
        sleep(Duration::from_millis(3100)).await;

        let durations: Vec<u64> = r
            .device
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                MockCommand::Linear { duration_ms, .. } => Some(duration_ms),
                _ => None,
            })
            .collect();
        assert_eq!(durations, vec![1000, 800, 600, 400, 200, 1000]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn linear_pattern_skips_a_segment_after_failure() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "stroker", 0), PlaybackConfig::default())?;
        r.device.fail_next(1);
        r.executor
            .execute(&occurrence(
                r#""LINEAR_PATTERN": {"segments": [{"start": 10, "end": 90, "durations": [100], "loop": 3}, {"start": 40, "end": 60, "durations": [200]}]}"#,
            )?)
            .await?;
        sleep(Duration::from_millis(2000)).await;

        let ok_positions: Vec<f64> = r
            .device
            .calls()
            .into_iter()
            .filter(|c| c.ok)
            .filter_map(|c| match c.command {
                MockCommand::Linear { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(ok_positions, vec![0.6]);
        assert_eq!(r.metrics.device_failures.get(), 1);

        let calls = r.device.calls();
        assert!(!calls[0].ok);
        assert_eq!(calls[1].at - calls[0].at, StrokeMachine::RECOVERY_PAUSE);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn per_motor_pattern_respects_caps_and_spacing() -> anyhow::Result<()> {
        let config = PlaybackConfig {
            motor_caps: vec![50, 80],
            ..PlaybackConfig::default()
        };
        let r = rig(MockDevice::new(0, "duo", Capabilities::vibrate_only(2)), config)?;
        let start = tokio::time::Instant::now();
        r.executor
            .execute(&occurrence(
                r#""VIBRATE": {"pattern": [[100, 20], [40, 90]], "interval": 200, "loop": 1}"#,
            )?)
            .await?;
        sleep(Duration::from_millis(1000)).await;

        let calls = r.device.calls();
        assert_eq!(
            calls.iter().map(|c| c.command).collect::<Vec<_>>(),
            vec![
                MockCommand::Vibrate { motor: 0, speed: 0.5 },
                MockCommand::Vibrate { motor: 1, speed: 0.2 },
                MockCommand::Vibrate { motor: 0, speed: 0.4 },
                MockCommand::Vibrate { motor: 1, speed: 0.8 },
                MockCommand::Vibrate { motor: 0, speed: 0.0 },
                MockCommand::Vibrate { motor: 1, speed: 0.0 },
            ]
        );
        let offsets: Vec<u128> = calls.iter().map(|c| (c.at - start).as_millis()).collect();
        assert_eq!(offsets, vec![0, 50, 250, 300, 500, 550]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn oscillate_pattern_rides_out_device_errors() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "osc", 0), PlaybackConfig::default())?;
        r.device.fail_next(1);
        let start = tokio::time::Instant::now();
        r.executor
            .execute(&occurrence(
                r#""OSCILLATE": {"pattern": [20, 60], "interval": 100}"#,
            )?)
            .await?;
        sleep(Duration::from_millis(350)).await;

        let calls = r.device.calls();
        let offsets: Vec<u128> = calls.iter().map(|c| (c.at - start).as_millis()).collect();
        assert_eq!(offsets, vec![0, 100, 200, 300]);
        assert_eq!(
            calls.iter().map(|c| c.ok).collect::<Vec<_>>(),
            vec![false, true, true, true]
        );
        assert_eq!(r.executor.active_effect(), Some("oscillate-pattern"));
        assert_eq!(r.metrics.device_failures.get(), 0);
        assert!(r.sink.statuses().iter().all(|s| !s.contains("failed")));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn oscillation_is_limited_by_the_first_cap() -> anyhow::Result<()> {
        let config = PlaybackConfig {
            motor_caps: vec![30],
            ..PlaybackConfig::default()
        };
        let r = rig(MockDevice::full(0, "osc", 0), config)?;
        r.executor.execute(&occurrence(r#""OSCILLATE": 80"#)?).await?;
        assert_eq!(r.device.commands(), vec![MockCommand::Oscillate { speed: 0.3 }]);
        assert_eq!(r.sink.displays(), vec![DisplayValue::Oscillate(30)]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn new_command_cancels_exactly_one_effect() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "stroker", 1), PlaybackConfig::default())?;
        r.executor
            .execute(&occurrence(
                r#""LINEAR": {"start_position": 0, "end_position": 100, "duration": 500}"#,
            )?)
            .await?;
        sleep(Duration::from_millis(100)).await;
        r.executor.execute(&occurrence(r#""VIBRATE": 30"#)?).await?;
        r.executor.execute(&occurrence(r#""VIBRATE": 40"#)?).await?;
        assert_eq!(r.metrics.effects_cancelled.get(), 1);
        assert_eq!(r.executor.active_effect(), None);

        let before = r.device.calls().len();
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(r.device.calls().len(), before);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_rests_every_output() -> anyhow::Result<()> {
        let r = rig(MockDevice::full(0, "all", 2), PlaybackConfig::default())?;
        r.executor.manual_stroke(10, 90, 400).await?;
        r.executor.stop_all().await?;
        assert_eq!(r.executor.active_effect(), None);
        let tail: Vec<MockCommand> = r.device.commands().into_iter().rev().take(3).collect();
        assert!(tail.contains(&MockCommand::Oscillate { speed: 0.0 }));
        assert!(tail.contains(&MockCommand::Vibrate { motor: 1, speed: 0.0 }));
        Ok(())
    }
}
