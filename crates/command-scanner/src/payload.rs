//! Typed payloads for the object and array command forms

use crate::{CommandKind, Result, ScanError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Intensity levels for one pattern step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Levels<'a> {
    /// Same intensity on every motor.
    All(f64),
    /// Intensity per motor index; motors past the end are left untouched.
    PerMotor(&'a [f64]),
}

/// `pattern` field: either one intensity per step, or per-motor
/// intensities per step (`[[m0, m1], [m0, m1], ...]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSteps {
    PerMotor(Vec<Vec<f64>>),
    Uniform(Vec<f64>),
}

impl PatternSteps {
    pub fn len(&self) -> usize {
        match self {
            Self::PerMotor(steps) => steps.len(),
            Self::Uniform(steps) => steps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Levels for `index`, wrapping around the pattern length.
    pub fn levels(&self, index: usize) -> Levels<'_> {
        match self {
            Self::PerMotor(steps) if !steps.is_empty() => {
                Levels::PerMotor(&steps[index % steps.len()])
            }
            Self::Uniform(steps) if !steps.is_empty() => Levels::All(steps[index % steps.len()]),
            _ => Levels::All(0.0),
        }
    }
}

/// A single wait in milliseconds, or a sequence cycled per step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Intervals {
    Fixed(u64),
    Sequence(Vec<u64>),
}

impl Intervals {
    pub fn len(&self) -> usize {
        match self {
            Self::Fixed(_) => 1,
            Self::Sequence(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interval for step `index`, cycling through the sequence.
    pub fn at(&self, index: usize) -> u64 {
        match self {
            Self::Fixed(ms) => *ms,
            Self::Sequence(v) if !v.is_empty() => v[index % v.len()],
            Self::Sequence(_) => 0,
        }
    }
}

/// Payload of `VIBRATE: {...}` and `OSCILLATE: {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: PatternSteps,
    pub interval: Intervals,
    /// Number of full passes before stopping; `None` repeats forever.
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loops: Option<u32>,
}

impl PatternSpec {
    fn check(&self) -> Result<(), &'static str> {
        if self.pattern.is_empty() {
            return Err("empty pattern");
        }
        if self.interval.is_empty() {
            return Err("empty interval list");
        }
        Ok(())
    }
}

/// Payload of `LINEAR: {...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSpec {
    pub start_position: u32,
    pub end_position: u32,
    pub duration: u64,
}

impl LinearSpec {
    fn check(&self) -> Result<(), &'static str> {
        if self.duration == 0 {
            return Err("duration must be positive");
        }
        Ok(())
    }
}

/// Payload of `LINEAR_SPEED: {...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSpeedSpec {
    pub start_position: u32,
    pub end_position: u32,
    pub start_duration: u64,
    pub end_duration: u64,
    pub steps: u32,
}

impl LinearSpeedSpec {
    fn check(&self) -> Result<(), &'static str> {
        if self.steps <= 1 {
            return Err("steps must be greater than 1");
        }
        Ok(())
    }

    /// Stroke duration for `step`, interpolated linearly from
    /// `start_duration` (step 0) to `end_duration` (last step).
    pub fn duration_at(&self, step: u32) -> u64 {
        let last = self.steps.saturating_sub(1).max(1) as f64;
        let progress = (step.min(self.steps.saturating_sub(1)) as f64) / last;
        let start = self.start_duration as f64;
        let end = self.end_duration as f64;
        (start + (end - start) * progress).round().max(0.0) as u64
    }
}

fn default_segment_loops() -> u32 {
    1
}

/// One segment of a `LINEAR_PATTERN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub start: u32,
    pub end: u32,
    pub durations: Intervals,
    #[serde(default = "default_segment_loops", rename = "loop")]
    pub loops: u32,
}

impl SegmentSpec {
    pub fn duration_count(&self) -> usize {
        self.durations.len()
    }
}

/// Payload of `LINEAR_PATTERN: {...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearPatternSpec {
    pub segments: Vec<SegmentSpec>,
    #[serde(default)]
    pub repeat: bool,
}

impl LinearPatternSpec {
    fn check(&self) -> Result<(), &'static str> {
        if self.segments.is_empty() {
            return Err("no segments");
        }
        Ok(())
    }
}

/// Quote bare identifier keys so `{start: 10}` parses as JSON.
///
/// Only identifiers directly after `{` or `,` and followed by `:` are
/// rewritten; string literals pass through untouched.
pub fn normalize_keys(src: &str) -> Cow<'_, str> {
    let bytes = src.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant = b'\0';
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
                last_significant = b;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        let key_position = last_significant == b'{' || last_significant == b',';
        if key_position && (b.is_ascii_alphabetic() || b == b'_') {
            let ident_end = bytes[i..]
                .iter()
                .position(|c| !(c.is_ascii_alphanumeric() || *c == b'_'))
                .map_or(bytes.len(), |p| i + p);
            let after = bytes[ident_end..]
                .iter()
                .position(|c| !c.is_ascii_whitespace())
                .map(|p| bytes[ident_end + p]);
            if after == Some(b':') {
                let buf = out.get_or_insert_with(|| String::with_capacity(src.len() + 8));
                buf.push_str(&src[copied..i]);
                buf.push('"');
                buf.push_str(&src[i..ident_end]);
                buf.push('"');
                copied = ident_end;
            }
            last_significant = b'a';
            i = ident_end;
            continue;
        }
        if !b.is_ascii_whitespace() {
            last_significant = b;
        }
        i += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&src[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(src),
    }
}

fn parse_json<T: DeserializeOwned>(kind: CommandKind, raw: &str) -> Result<T> {
    serde_json::from_str(&normalize_keys(raw))
        .map_err(|source| ScanError::MalformedPayload { kind, source })
}

fn invalid(kind: CommandKind) -> impl Fn(&'static str) -> ScanError {
    move |reason| ScanError::InvalidPayload { kind, reason }
}

pub(crate) fn parse_pattern(kind: CommandKind, raw: &str) -> Result<PatternSpec> {
    let spec: PatternSpec = parse_json(kind, raw)?;
    spec.check().map_err(invalid(kind))?;
    Ok(spec)
}

pub(crate) fn parse_levels(kind: CommandKind, raw: &str) -> Result<Vec<f64>> {
    let levels: Vec<f64> = parse_json(kind, raw)?;
    if levels.is_empty() {
        return Err(invalid(kind)("empty intensity array"));
    }
    Ok(levels)
}

pub(crate) fn parse_linear(raw: &str) -> Result<LinearSpec> {
    let spec: LinearSpec = parse_json(CommandKind::Linear, raw)?;
    spec.check().map_err(invalid(CommandKind::Linear))?;
    Ok(spec)
}

pub(crate) fn parse_linear_speed(raw: &str) -> Result<LinearSpeedSpec> {
    let spec: LinearSpeedSpec = parse_json(CommandKind::LinearSpeed, raw)?;
    spec.check().map_err(invalid(CommandKind::LinearSpeed))?;
    Ok(spec)
}

pub(crate) fn parse_linear_pattern(raw: &str) -> Result<LinearPatternSpec> {
    let spec: LinearPatternSpec = parse_json(CommandKind::LinearPattern, raw)?;
    spec.check().map_err(invalid(CommandKind::LinearPattern))?;
    Ok(spec)
}
