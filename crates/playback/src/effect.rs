//! The single slot for a long-running autonomous effect

use crate::PlaybackMetrics;
use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct ActiveEffect {
    label: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveEffect {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Holds at most one running effect (pattern playback, stroke loop, ramp).
/// Installing or cancelling is a single call regardless of effect type.
pub struct EffectSlot {
    active: Mutex<Option<ActiveEffect>>,
    metrics: PlaybackMetrics,
}

impl EffectSlot {
    pub fn new(metrics: PlaybackMetrics) -> Self {
        Self {
            active: Mutex::new(None),
            metrics,
        }
    }

    /// Spawn `effect` as the active effect, stopping any previous one.
    pub fn install<F>(&self, label: &'static str, effect: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {}
                _ = effect => {}
            }
        });
        let previous = self.active.lock().replace(ActiveEffect {
            label,
            token,
            handle,
        });
        if let Some(previous) = previous {
            self.stop(previous);
        }
        debug!(effect = label, "effect started");
    }

    /// Stop the active effect. Returns `true` if one was still running.
    pub fn cancel(&self) -> bool {
        let previous = self.active.lock().take();
        previous.map_or(false, |effect| self.stop(effect))
    }

    /// Label of the running effect, if any.
    pub fn current(&self) -> Option<&'static str> {
        self.active
            .lock()
            .as_ref()
            .filter(|e| e.is_running())
            .map(|e| e.label)
    }

    fn stop(&self, effect: ActiveEffect) -> bool {
        let running = effect.is_running();
        effect.token.cancel();
        if running {
            self.metrics.effects_cancelled.inc();
            debug!(effect = effect.label, "effect cancelled");
        }
        running
    }
}

impl Drop for EffectSlot {
    fn drop(&mut self) {
        if let Some(effect) = self.active.get_mut().take() {
            effect.token.cancel();
        }
    }
}
