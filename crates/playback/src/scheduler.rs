//! Scheduler bookkeeping shared by the drain loop

use crate::{MessageId, PlaybackConfig};
use command_scanner::{Occurrence, SeenOccurrences};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Time still to wait before acting on text `distance` characters ahead,
/// given that `elapsed` has already passed since the last execution.
pub fn pacing_wait(config: &PlaybackConfig, distance: usize, elapsed: Duration) -> Duration {
    config.reading_delay(distance).saturating_sub(elapsed)
}

/// Everything the drain loop reads and writes, kept under one lock.
#[derive(Debug)]
pub(crate) struct ExecutionState {
    pub message: MessageId,
    pub text: String,
    /// Length of `text` in characters.
    pub text_len: usize,
    pub last_executed_offset: usize,
    pub last_execution_at: Instant,
    pub seen: SeenOccurrences,
    pub pending: VecDeque<Occurrence>,
    pub draining: bool,
    /// Bumped on every reset; a drain only commits results for its own
    /// generation.
    pub generation: u64,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            message: MessageId(0),
            text: String::new(),
            text_len: 0,
            last_executed_offset: 0,
            last_execution_at: Instant::now(),
            seen: SeenOccurrences::new(),
            pending: VecDeque::new(),
            draining: false,
            generation: 0,
        }
    }

    /// Forget all progress and switch to `message`.
    pub fn reset(&mut self, message: MessageId) {
        self.generation = self.generation.wrapping_add(1);
        if self.message != message {
            self.text.clear();
            self.text_len = 0;
        }
        self.message = message;
        self.last_executed_offset = 0;
        self.last_execution_at = Instant::now();
        self.seen.reset();
        self.pending.clear();
        self.draining = false;
    }

    pub fn set_text(&mut self, text: &str) {
        if self.text != text {
            self.text.clear();
            self.text.push_str(text);
            self.text_len = text.chars().count();
        }
    }

    /// Wait owed before acting at `offset`.
    pub fn wait_until(&self, config: &PlaybackConfig, offset: usize) -> Duration {
        let distance = offset.saturating_sub(self.last_executed_offset);
        pacing_wait(config, distance, self.last_execution_at.elapsed())
    }

    /// Queue every seen occurrence again from the top of the message.
    pub fn requeue_for_loop(&mut self) -> usize {
        let replay = self.seen.replay();
        let count = replay.len();
        self.pending.extend(replay);
        self.last_executed_offset = 0;
        self.last_execution_at = Instant::now();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_time_is_credited_against_reading_delay() {
        let cfg = PlaybackConfig::default();
        assert_eq!(
            pacing_wait(&cfg, 100, Duration::ZERO),
            Duration::from_millis(5000)
        );
        assert_eq!(
            pacing_wait(&cfg, 100, Duration::from_millis(1200)),
            Duration::from_millis(3800)
        );
        assert_eq!(
            pacing_wait(&cfg, 100, Duration::from_secs(9)),
            Duration::ZERO
        );
    }

    #[test]
    fn pacing_can_be_disabled() {
        let cfg = PlaybackConfig {
            reading_speed_cps: 0.0,
            ..PlaybackConfig::default()
        };
        assert_eq!(pacing_wait(&cfg, 10_000, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn reset_clears_progress_and_bumps_generation() {
        let mut st = ExecutionState::new();
        st.set_text(r#"a "VIBRATE": 10"#);
        st.seen.retain_new(command_scanner::scan(&st.text));
        st.last_executed_offset = 12;
        st.draining = true;

        st.reset(MessageId(0));
        assert_eq!(st.generation, 1);
        assert!(st.seen.is_empty());
        assert_eq!(st.last_executed_offset, 0);
        assert!(!st.draining);
        assert_eq!(st.text_len, 15);

        st.reset(MessageId(2));
        assert!(st.text.is_empty());
        assert_eq!(st.message, MessageId(2));
    }

    #[test]
    fn loop_requeue_replays_in_offset_order() {
        let mut st = ExecutionState::new();
        let text = r#""VIBRATE": 10 then "OSCILLATE": 20"#;
        st.seen.retain_new(command_scanner::scan(text));
        st.last_executed_offset = 30;

        assert_eq!(st.requeue_for_loop(), 2);
        assert_eq!(st.last_executed_offset, 0);
        let starts: Vec<usize> = st.pending.iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![0, 19]);
    }
}
