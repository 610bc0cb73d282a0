//! Presentation hooks: status text, displayed values, highlights, progress

use crate::MessageId;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::{debug, info, trace};

/// Values the UI mirrors on its sliders and readouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayValue {
    /// Vibration intensity in percent.
    Vibrate(u32),
    Oscillate(u32),
    /// Linear stroke range in percent.
    Position { start: u32, end: u32 },
    /// Current stroke duration in milliseconds.
    StrokeDuration(u64),
    /// Current pattern interval; `None` once no pattern is running.
    Interval(Option<u64>),
}

/// Sink for everything the playback engine wants to show. Every method
/// must return quickly; none of them may block playback.
pub trait PresentationSink: Send + Sync {
    fn status(&self, text: &str);

    fn display(&self, _value: DisplayValue) {}

    /// Mark `[start, start + len)` of `element` as a detected command,
    /// drawn in `color`.
    fn highlight(&self, _element: MessageId, _start: usize, _len: usize, _color: &str) {}

    /// Reading progress within `element`, currently at `current` on the way
    /// from `from` to `to`, drawn in `color`.
    fn progress_frame(
        &self,
        _element: MessageId,
        _from: usize,
        _current: usize,
        _to: usize,
        _color: &str,
    ) {
    }
}

/// Routes presentation output to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn status(&self, text: &str) {
        info!("Status: {text}");
    }

    fn display(&self, value: DisplayValue) {
        debug!(?value, "display");
    }

    fn highlight(&self, element: MessageId, start: usize, len: usize, color: &str) {
        debug!(%element, start, len, color, "highlight");
    }

    fn progress_frame(
        &self,
        element: MessageId,
        from: usize,
        current: usize,
        to: usize,
        color: &str,
    ) {
        trace!(%element, from, current, to, color, "progress");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub at: OffsetDateTime,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub element: MessageId,
    pub start: usize,
    pub len: usize,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressFrame {
    pub element: MessageId,
    pub from: usize,
    pub current: usize,
    pub to: usize,
    pub color: String,
}

/// Keeps everything it is shown; useful for tests and transcripts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<StatusEvent>>,
    displays: Mutex<Vec<DisplayValue>>,
    highlights: Mutex<Vec<Highlight>>,
    frames: Mutex<Vec<ProgressFrame>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().iter().map(|s| s.text.clone()).collect()
    }

    pub fn status_events(&self) -> Vec<StatusEvent> {
        self.statuses.lock().clone()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses.lock().last().map(|s| s.text.clone())
    }

    pub fn displays(&self) -> Vec<DisplayValue> {
        self.displays.lock().clone()
    }

    pub fn highlights(&self) -> Vec<Highlight> {
        self.highlights.lock().clone()
    }

    /// `(from, current, to)` of every progress frame.
    pub fn frames(&self) -> Vec<(usize, usize, usize)> {
        self.frames
            .lock()
            .iter()
            .map(|f| (f.from, f.current, f.to))
            .collect()
    }

    pub fn progress_frames(&self) -> Vec<ProgressFrame> {
        self.frames.lock().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn status(&self, text: &str) {
        self.statuses.lock().push(StatusEvent {
            at: OffsetDateTime::now_utc(),
            text: text.to_string(),
        });
    }

    fn display(&self, value: DisplayValue) {
        self.displays.lock().push(value);
    }

    fn highlight(&self, element: MessageId, start: usize, len: usize, color: &str) {
        self.highlights.lock().push(Highlight {
            element,
            start,
            len,
            color: color.to_string(),
        });
    }

    fn progress_frame(
        &self,
        element: MessageId,
        from: usize,
        current: usize,
        to: usize,
        color: &str,
    ) {
        self.frames.lock().push(ProgressFrame {
            element,
            from,
            current,
            to,
            color: color.to_string(),
        });
    }
}
