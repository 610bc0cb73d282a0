//! Segment-sequence state machine behind `LINEAR_PATTERN`

use command_scanner::LinearPatternSpec;
use std::time::Duration;

/// Position within a running pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub segment: usize,
    pub loop_index: u32,
    pub duration_index: usize,
    /// `true` while the actuator sits at the segment start, so the next
    /// stroke goes to the segment end.
    pub at_start: bool,
}

impl Cursor {
    fn at_segment(segment: usize, at_start: bool) -> Self {
        Self {
            segment,
            loop_index: 0,
            duration_index: 0,
            at_start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeState {
    Running(Cursor),
    /// Past the last segment of a repeating pattern; restarts at segment 0.
    Repeating { at_start: bool },
    Finished,
}

/// One move: go to `position` (percent) over `duration_ms`, then wait as long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    pub segment: usize,
    pub position: u32,
    pub duration_ms: u64,
}

pub struct StrokeMachine {
    spec: LinearPatternSpec,
    state: StrokeState,
}

impl StrokeMachine {
    /// Pause before moving on after a failed stroke.
    pub const RECOVERY_PAUSE: Duration = Duration::from_millis(500);

    pub fn new(spec: LinearPatternSpec) -> Self {
        Self {
            spec,
            state: StrokeState::Running(Cursor::at_segment(0, true)),
        }
    }

    pub fn state(&self) -> StrokeState {
        self.state
    }

    /// Advance to the next stroke, or `None` once the pattern is finished.
    pub fn next_stroke(&mut self) -> Option<Stroke> {
        let segments = self.spec.segments.len();
        // Segments entered without producing a stroke. More than a full
        // pass means nothing is playable.
        let mut skipped = 0usize;
        loop {
            let mut cursor = match self.state {
                StrokeState::Finished => return None,
                StrokeState::Repeating { at_start } => {
                    self.state = StrokeState::Running(Cursor::at_segment(0, at_start));
                    continue;
                }
                StrokeState::Running(cursor) => cursor,
            };

            let Some(segment) = self.spec.segments.get(cursor.segment) else {
                self.state = if self.spec.repeat && skipped <= segments {
                    StrokeState::Repeating {
                        at_start: cursor.at_start,
                    }
                } else {
                    StrokeState::Finished
                };
                continue;
            };

            if segment.durations.is_empty() || cursor.loop_index >= segment.loops {
                skipped += 1;
                if skipped > segments {
                    self.state = StrokeState::Finished;
                    return None;
                }
                self.state =
                    StrokeState::Running(Cursor::at_segment(cursor.segment + 1, cursor.at_start));
                continue;
            }

            let stroke = Stroke {
                segment: cursor.segment,
                position: if cursor.at_start {
                    segment.end
                } else {
                    segment.start
                },
                duration_ms: segment.durations.at(cursor.duration_index),
            };
            cursor.at_start = !cursor.at_start;
            cursor.duration_index += 1;
            if cursor.duration_index >= segment.duration_count() {
                cursor.duration_index = 0;
                cursor.loop_index += 1;
            }
            self.state = StrokeState::Running(cursor);
            return Some(stroke);
        }
    }

    /// Give up on the current segment after the stroke just returned by
    /// [`StrokeMachine::next_stroke`] failed. The next stroke comes from the
    /// following segment with fresh counters, heading the same way the
    /// failed one did since the actuator never got there.
    pub fn abandon_segment(&mut self) {
        if let StrokeState::Running(cursor) = self.state {
            self.state =
                StrokeState::Running(Cursor::at_segment(cursor.segment + 1, !cursor.at_start));
        }
    }
}
