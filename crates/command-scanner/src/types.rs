//! Occurrence and command types produced by the scanner

use crate::payload::{LinearPatternSpec, LinearSpec, LinearSpeedSpec, PatternSpec};
use core::fmt;
use serde::Serialize;

/// The command families recognised in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    VibrateSingle,
    VibrateMulti,
    VibrateArray,
    OscillateSingle,
    OscillateMulti,
    Linear,
    LinearSpeed,
    LinearPattern,
}

impl CommandKind {
    /// Tie-break order for occurrences starting at the same offset.
    /// `LinearPattern` claims its span before the flat-object scans.
    pub fn priority(self) -> u8 {
        match self {
            Self::LinearPattern => 0,
            Self::LinearSpeed => 1,
            Self::Linear => 2,
            Self::VibrateMulti => 3,
            Self::VibrateArray => 4,
            Self::VibrateSingle => 5,
            Self::OscillateMulti => 6,
            Self::OscillateSingle => 7,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VibrateSingle => "VIBRATE",
            Self::VibrateMulti => "VIBRATE pattern",
            Self::VibrateArray => "VIBRATE array",
            Self::OscillateSingle => "OSCILLATE",
            Self::OscillateMulti => "OSCILLATE pattern",
            Self::Linear => "LINEAR",
            Self::LinearSpeed => "LINEAR_SPEED",
            Self::LinearPattern => "LINEAR_PATTERN",
        };
        f.write_str(name)
    }
}

/// A parsed command with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Command {
    /// Single intensity (0-100) applied to every motor.
    VibrateSingle(u32),
    VibrateMulti(PatternSpec),
    /// One intensity per motor, in motor order.
    VibrateArray(Vec<f64>),
    OscillateSingle(u32),
    OscillateMulti(PatternSpec),
    Linear(LinearSpec),
    LinearSpeed(LinearSpeedSpec),
    LinearPattern(LinearPatternSpec),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::VibrateSingle(_) => CommandKind::VibrateSingle,
            Self::VibrateMulti(_) => CommandKind::VibrateMulti,
            Self::VibrateArray(_) => CommandKind::VibrateArray,
            Self::OscillateSingle(_) => CommandKind::OscillateSingle,
            Self::OscillateMulti(_) => CommandKind::OscillateMulti,
            Self::Linear(_) => CommandKind::Linear,
            Self::LinearSpeed(_) => CommandKind::LinearSpeed,
            Self::LinearPattern(_) => CommandKind::LinearPattern,
        }
    }
}

/// Deduplication identity: start offset plus the literal matched text.
pub type OccurrenceKey = (usize, String);

/// One detected command instance.
///
/// Offsets count Unicode scalar values, not bytes, so they line up with
/// what a reader perceives as characters of the message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub start: usize,
    pub len: usize,
    pub raw: String,
    pub command: Command,
}

impl Occurrence {
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    /// Exclusive end offset of the matched span.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn key(&self) -> OccurrenceKey {
        (self.start, self.raw.clone())
    }
}
