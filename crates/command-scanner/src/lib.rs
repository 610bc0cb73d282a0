//! Command scanner for chat text
//!
//! This crate finds device commands (`VIBRATE`, `OSCILLATE`, `LINEAR`,
//! `LINEAR_SPEED`, `LINEAR_PATTERN`) embedded in free-form, possibly still
//! streaming, chat text and turns them into ordered [`Occurrence`]s.

mod balance;
mod dedup;
mod error;
mod payload;
mod scanner;
mod types;

pub use balance::find_closing_brace;
pub use dedup::SeenOccurrences;
pub use error::{Result, ScanError};
pub use payload::{
    normalize_keys, Intervals, Levels, LinearPatternSpec, LinearSpec, LinearSpeedSpec,
    PatternSpec, PatternSteps, SegmentSpec,
};
pub use scanner::{scan, scan_streaming, Scanner};
pub use types::{Command, CommandKind, Occurrence, OccurrenceKey};

