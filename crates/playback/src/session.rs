//! Playback session: scanning, deduplication, paced draining and loop mode

use crate::scheduler::ExecutionState;
use crate::{
    Executor, MessageId, MessageSource, PlaybackConfig, PlaybackError, PlaybackMetrics,
    PresentationSink, ProgressAnimator, Result,
};
use command_scanner::{Occurrence, Scanner};
use device_transport::{Device, DeviceClient, DeviceEvent};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One playback session. Cheap to clone; clones share all state.
///
/// The session watches one chat message at a time. New commands found in
/// its text are queued and executed in offset order, paced as if a reader
/// were reading the message.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<RwLock<PlaybackConfig>>,
    sink: Arc<dyn PresentationSink>,
    executor: Executor,
    scanner: Scanner,
    metrics: PlaybackMetrics,
    // Lock order: `state` before `cancel`.
    state: Mutex<ExecutionState>,
    cancel: Mutex<CancellationToken>,
    enqueued: Notify,
    idle: watch::Sender<bool>,
}

/// One occurrence taken off the queue, with the context to pace it.
struct Step {
    occurrence: Occurrence,
    element: MessageId,
    from: usize,
    wait: Duration,
}

impl Session {
    pub fn new(config: PlaybackConfig, sink: Arc<dyn PresentationSink>) -> Result<Self> {
        let metrics = PlaybackMetrics::new()?;
        let scanner = Scanner::new()?;
        let config = Arc::new(RwLock::new(config));
        let executor = Executor::new(config.clone(), sink.clone(), metrics.clone());
        let (idle, _) = watch::channel(true);
        info!("Playback session created");
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sink,
                executor,
                scanner,
                metrics,
                state: Mutex::new(ExecutionState::new()),
                cancel: Mutex::new(CancellationToken::new()),
                enqueued: Notify::new(),
                idle,
            }),
        })
    }

    /// Shared configuration; changes apply from the next executed command.
    pub fn config(&self) -> Arc<RwLock<PlaybackConfig>> {
        self.inner.config.clone()
    }

    pub fn metrics(&self) -> &PlaybackMetrics {
        &self.inner.metrics
    }

    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    pub fn current_message(&self) -> MessageId {
        self.inner.state.lock().message
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn seen_len(&self) -> usize {
        self.inner.state.lock().seen.len()
    }

    pub fn last_executed_offset(&self) -> usize {
        self.inner.state.lock().last_executed_offset
    }

    pub fn is_draining(&self) -> bool {
        self.inner.state.lock().draining
    }

    /// Scan the current text of message `id` and queue the commands not
    /// seen before. A different `id` than last time resets the session
    /// first. Returns how many occurrences were queued.
    ///
    /// A number at the very end of the text may still be growing, so it is
    /// only queued once more text follows it or the same text is observed
    /// twice in a row.
    pub fn observe(&self, id: MessageId, text: &str) -> usize {
        let fresh = {
            let mut st = self.inner.state.lock();
            if st.message != id {
                info!(from = %st.message, to = %id, "message changed, resetting playback");
                self.inner.reset_locked(&mut st, id);
            }
            let settled = !text.is_empty() && st.text == text;
            let found = if settled {
                self.inner.scanner.scan(text)
            } else {
                self.inner.scanner.scan_streaming(text)
            };
            st.set_text(text);
            let fresh = st.seen.retain_new(found);
            if !fresh.is_empty() {
                st.pending.extend(fresh.iter().cloned());
                self.inner.metrics.queue_depth.set(st.pending.len() as i64);
                self.inner.ensure_drain(&mut st);
            }
            fresh
        };
        self.announce(id, &fresh);
        fresh.len()
    }

    /// Queue one occurrence directly, bypassing deduplication.
    pub fn enqueue(&self, occurrence: Occurrence) {
        let element = {
            let mut st = self.inner.state.lock();
            st.pending.push_back(occurrence.clone());
            self.inner.metrics.queue_depth.set(st.pending.len() as i64);
            self.inner.ensure_drain(&mut st);
            st.message
        };
        self.announce(element, std::slice::from_ref(&occurrence));
    }

    fn announce(&self, element: MessageId, fresh: &[Occurrence]) {
        let color = self.inner.config.read().highlight.command.clone();
        for occ in fresh {
            debug!(
                %element,
                kind = %occ.kind(),
                start = occ.start,
                len = occ.len,
                "command scheduled"
            );
            self.inner.sink.highlight(element, occ.start, occ.len, &color);
            self.inner.metrics.occurrences_scheduled.inc();
        }
        if !fresh.is_empty() {
            self.inner.enqueued.notify_waiters();
        }
    }

    /// Drop all progress on the current message and scan it again from
    /// the beginning.
    pub fn rescan(&self) -> usize {
        let (id, text) = {
            let mut st = self.inner.state.lock();
            let id = st.message;
            self.inner.reset_locked(&mut st, id);
            (id, st.text.clone())
        };
        info!(message = %id, "rescanning message");
        self.observe(id, &text)
    }

    /// Clear queue, seen set, offsets and the running effect.
    pub fn reset(&self) {
        let mut st = self.inner.state.lock();
        let id = st.message;
        self.inner.reset_locked(&mut st, id);
    }

    /// Process the source's latest message. Skipped while no device is
    /// attached.
    pub fn poll(&self, source: &dyn MessageSource) -> usize {
        if !self.inner.executor.has_device() {
            return 0;
        }
        match source.latest() {
            Some(snapshot) => self.observe(snapshot.id, &snapshot.text),
            None => 0,
        }
    }

    /// Poll `source` every `poll_interval_ms` until `stop` fires.
    pub async fn run_poller(&self, source: Arc<dyn MessageSource>, stop: CancellationToken) {
        let period = self.inner.config.read().poll_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(?period, "message poller started");
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll(source.as_ref());
                }
            }
        }
        info!("message poller stopped");
    }

    pub async fn attach_device(&self, device: Arc<dyn Device>) {
        info!(device = %device.info(), caps = ?device.capabilities(), "device attached");
        self.inner.executor.set_device(device);
        self.inner.sink.status("Device found!");
        let initial = self.inner.config.read().initial_vibration;
        if let Some(level) = initial {
            if let Err(e) = self.inner.executor.manual_vibrate(level).await {
                warn!(error = %e, "initial vibration failed");
            }
        }
    }

    /// Reset playback and forget the device.
    pub fn detach_device(&self) {
        self.reset();
        if let Some(device) = self.inner.executor.clear_device() {
            info!(device = %device.info(), "device detached");
        }
        self.inner.sink.status("Device removed");
    }

    /// Track devices announced by `client` until `stop` fires or the
    /// client goes away.
    pub async fn follow_client(&self, client: &dyn DeviceClient, stop: CancellationToken) {
        let mut events = client.subscribe();
        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(DeviceEvent::Added(device)) => self.attach_device(device).await,
                Ok(DeviceEvent::Removed(info)) => {
                    let current = self.inner.executor.device();
                    if current.is_some_and(|d| d.info().index == info.index) {
                        self.detach_device();
                    } else {
                        debug!(device = %info, "ignoring removal of unattached device");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "device events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("device follower stopped");
    }

    /// Stop the running effect and bring the device to rest.
    pub async fn stop_all(&self) -> Result<()> {
        self.inner.executor.stop_all().await
    }

    pub async fn manual_vibrate(&self, level: u32) -> Result<()> {
        self.inner.executor.manual_vibrate(level).await
    }

    pub async fn manual_stroke(&self, start: u32, end: u32, duration_ms: u64) -> Result<()> {
        self.inner.executor.manual_stroke(start, end, duration_ms).await
    }

    /// Resolve once the drain loop has nothing left to do.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

impl Inner {
    fn reset_locked(&self, st: &mut ExecutionState, id: MessageId) {
        st.reset(id);
        self.metrics.queue_depth.set(0);
        let stale = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        stale.cancel();
        self.executor.cancel_effect();
        self.idle.send_replace(true);
    }

    fn ensure_drain(self: &Arc<Self>, st: &mut ExecutionState) {
        if st.draining {
            return;
        }
        st.draining = true;
        self.idle.send_replace(false);
        let token = self.cancel.lock().clone();
        let generation = st.generation;
        debug!(generation, "starting drain");
        tokio::spawn(self.clone().drain(generation, token));
    }

    async fn drain(self: Arc<Self>, generation: u64, token: CancellationToken) {
        loop {
            while let Some(step) = self.next_step(generation) {
                if !self.play(step, generation, &token).await {
                    return;
                }
            }
            self.trailing_wait(generation, &token).await;
            if token.is_cancelled() {
                return;
            }
            if self.loop_replay(generation, &token).await {
                continue;
            }
            if token.is_cancelled() || self.finish(generation) {
                return;
            }
        }
    }

    fn next_step(&self, generation: u64) -> Option<Step> {
        let mut st = self.state.lock();
        if st.generation != generation {
            return None;
        }
        let occurrence = st.pending.pop_front()?;
        self.metrics.queue_depth.set(st.pending.len() as i64);
        let wait = st.wait_until(&self.config.read(), occurrence.start);
        Some(Step {
            element: st.message,
            from: st.last_executed_offset,
            wait,
            occurrence,
        })
    }

    /// Pace, animate and execute one occurrence. Returns `false` once the
    /// drain has been superseded.
    async fn play(&self, step: Step, generation: u64, token: &CancellationToken) -> bool {
        let Step {
            occurrence,
            element,
            from,
            wait,
        } = step;

        if !wait.is_zero() {
            debug!(start = occurrence.start, ?wait, "pacing before command");
            let animation = token.child_token();
            self.spawn_animation(element, from, occurrence.start, wait, animation.clone());
            let cancelled = tokio::select! {
                biased;
                _ = token.cancelled() => true,
                _ = sleep(wait) => false,
            };
            animation.cancel();
            if cancelled {
                return false;
            }
        }

        let began = Instant::now();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            result = self.executor.execute(&occurrence) => result,
        };
        match result {
            Ok(()) => {}
            Err(PlaybackError::NoDevice) => {
                debug!(start = occurrence.start, "no device, command skipped");
            }
            Err(e) => debug!(start = occurrence.start, error = %e, "command failed"),
        }

        let mut st = self.state.lock();
        if st.generation != generation {
            return false;
        }
        st.last_execution_at = began;
        st.last_executed_offset = occurrence.end();
        true
    }

    fn spawn_animation(
        &self,
        element: MessageId,
        from: usize,
        to: usize,
        duration: Duration,
        token: CancellationToken,
    ) {
        let animator = {
            let cfg = self.config.read();
            ProgressAnimator::new(cfg.frame_interval(), cfg.highlight.progress.clone())
        };
        let sink = self.sink.clone();
        tokio::spawn(async move {
            animator
                .run(sink.as_ref(), element, from, to, duration, &token)
                .await;
        });
    }

    /// Animate reading of the text after the last command. Interrupted by
    /// new commands; skipped when it would take longer than the cap.
    async fn trailing_wait(&self, generation: u64, token: &CancellationToken) {
        let enqueued = self.enqueued.notified();
        tokio::pin!(enqueued);
        enqueued.as_mut().enable();

        let (element, from, to, wait) = {
            let st = self.state.lock();
            if st.generation != generation || !st.pending.is_empty() {
                return;
            }
            let cfg = self.config.read();
            let wait = st.wait_until(&cfg, st.text_len);
            if wait > cfg.trailing_wait_cap() {
                debug!(?wait, "trailing text too long to pace");
                return;
            }
            (st.message, st.last_executed_offset, st.text_len, wait)
        };
        if to <= from || wait.is_zero() {
            return;
        }

        let animation = token.child_token();
        self.spawn_animation(element, from, to, wait, animation.clone());
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = &mut enqueued => debug!("trailing wait interrupted by new command"),
            _ = sleep(wait) => {}
        }
        animation.cancel();
    }

    /// In loop mode, wait the loop interval and queue the whole message
    /// again. Returns `true` when there is more to drain.
    async fn loop_replay(&self, generation: u64, token: &CancellationToken) -> bool {
        let enqueued = self.enqueued.notified();
        tokio::pin!(enqueued);
        enqueued.as_mut().enable();

        let interval = {
            let st = self.state.lock();
            if st.generation != generation {
                return false;
            }
            if !st.pending.is_empty() {
                return true;
            }
            let cfg = self.config.read();
            if !cfg.loop_enabled || st.seen.is_empty() || !self.executor.has_device() {
                return false;
            }
            cfg.loop_interval()
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            _ = &mut enqueued => return true,
            _ = sleep(interval) => {}
        }

        let mut st = self.state.lock();
        if st.generation != generation {
            return false;
        }
        if !st.pending.is_empty() {
            return true;
        }
        if !self.config.read().loop_enabled || !self.executor.has_device() {
            return false;
        }
        let count = st.requeue_for_loop();
        self.metrics.queue_depth.set(st.pending.len() as i64);
        info!(count, message = %st.message, "loop mode: replaying message");
        true
    }

    /// Mark the drain finished unless more work arrived meanwhile.
    /// Returns `true` if the drain should exit.
    fn finish(&self, generation: u64) -> bool {
        let mut st = self.state.lock();
        if st.generation != generation {
            return true;
        }
        if !st.pending.is_empty() {
            return false;
        }
        st.draining = false;
        self.idle.send_replace(true);
        debug!(generation, "drain finished");
        true
    }
}
