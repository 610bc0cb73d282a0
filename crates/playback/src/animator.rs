//! Reading-progress animation between two text offsets

use crate::{MessageId, PresentationSink};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Drives a progress indicator from one offset to another over a fixed
/// duration, one frame at a time.
#[derive(Debug, Clone)]
pub struct ProgressAnimator {
    frame: Duration,
    color: String,
}

impl ProgressAnimator {
    pub fn new(frame: Duration, color: impl Into<String>) -> Self {
        Self {
            frame: frame.max(Duration::from_millis(1)),
            color: color.into(),
        }
    }

    /// Animate `[from, to)` over `duration`.
    ///
    /// Returns `true` when the final frame was shown and `false` when
    /// cancelled; either way the call resolves promptly once the token fires.
    pub async fn run(
        &self,
        sink: &dyn PresentationSink,
        element: MessageId,
        from: usize,
        to: usize,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        if to <= from || duration.is_zero() {
            sink.progress_frame(element, from, to.max(from), to.max(from), &self.color);
            return true;
        }
        let started = Instant::now();
        let span = (to - from) as f64;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= duration {
                sink.progress_frame(element, from, to, to, &self.color);
                return true;
            }
            let fraction = elapsed.as_secs_f64() / duration.as_secs_f64();
            let current = from + (span * fraction).floor() as usize;
            sink.progress_frame(element, from, current.min(to), to, &self.color);

            let next = self.frame.min(duration - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep(next) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingSink;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn advances_monotonically_to_the_target() {
        let sink = RecordingSink::new();
        let animator = ProgressAnimator::new(Duration::from_millis(100), "#90caf9");
        let done = animator
            .run(
                &sink,
                MessageId(1),
                10,
                60,
                Duration::from_millis(1000),
                &CancellationToken::new(),
            )
            .await;
        assert!(done);

        let frames = sink.frames();
        assert_eq!(frames.first(), Some(&(10, 10, 60)));
        assert_eq!(frames.last(), Some(&(10, 60, 60)));
        assert!(frames.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!((10..=12).contains(&frames.len()), "{} frames", frames.len());
        assert!(sink.progress_frames().iter().all(|f| f.color == "#90caf9"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_resolves_the_wait() {
        let sink = Arc::new(RecordingSink::new());
        let token = CancellationToken::new();
        let task = {
            let sink = sink.clone();
            let token = token.clone();
            tokio::spawn(async move {
                ProgressAnimator::new(Duration::from_millis(50), "blue")
                    .run(
                        sink.as_ref(),
                        MessageId(1),
                        0,
                        100,
                        Duration::from_secs(60),
                        &token,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(120)).await;
        token.cancel();
        assert!(!task.await.unwrap_or(true));
        assert!(sink.frames().iter().all(|f| f.1 < 100));
    }
}
