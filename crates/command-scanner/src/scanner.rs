//! Command scanner for device instructions embedded in chat text

use crate::balance::find_closing_brace;
use crate::payload::{
    parse_levels, parse_linear, parse_linear_pattern, parse_linear_speed, parse_pattern,
};
use crate::{Command, CommandKind, Occurrence, Result, ScanError};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Key prefix: optional quotes, whole-word key, colon.
fn key(name: &str) -> String {
    format!(r#"(?i)"?\b{name}\b"?\s*:\s*"#)
}

const FLAT_OBJECT: &str = r"(\{[^{}]*\})";
const FLAT_ARRAY: &str = r"(\[[^\[\]]*\])";
const INTEGER: &str = r"(\d+)";

/// A candidate span found by one sub-scan, in byte offsets.
struct Hit {
    kind: CommandKind,
    start: usize,
    end: usize,
    parsed: Result<Command>,
}

/// Stateless scanner; holds only its compiled patterns.
pub struct Scanner {
    linear_pattern: Regex,
    linear_speed: Regex,
    linear: Regex,
    vibrate_object: Regex,
    vibrate_array: Regex,
    vibrate_number: Regex,
    oscillate_object: Regex,
    oscillate_number: Regex,
}

impl Scanner {
    /// Compile the command patterns.
    pub fn new() -> Result<Self> {
        Ok(Self {
            linear_pattern: Regex::new(&format!(r"{}\{{", key("LINEAR_PATTERN")))?,
            linear_speed: Regex::new(&format!("{}{}", key("LINEAR_SPEED"), FLAT_OBJECT))?,
            linear: Regex::new(&format!("{}{}", key("LINEAR"), FLAT_OBJECT))?,
            vibrate_object: Regex::new(&format!("{}{}", key("VIBRATE"), FLAT_OBJECT))?,
            vibrate_array: Regex::new(&format!("{}{}", key("VIBRATE"), FLAT_ARRAY))?,
            vibrate_number: Regex::new(&format!("{}{}", key("VIBRATE"), INTEGER))?,
            oscillate_object: Regex::new(&format!("{}{}", key("OSCILLATE"), FLAT_OBJECT))?,
            oscillate_number: Regex::new(&format!("{}{}", key("OSCILLATE"), INTEGER))?,
        })
    }

    /// Find every command in complete `text`, sorted by start offset.
    pub fn scan(&self, text: &str) -> Vec<Occurrence> {
        self.scan_with(text, true)
    }

    /// Like [`Scanner::scan`], for text that may still be growing.
    ///
    /// An integer form that runs to the very end of `text` might gain more
    /// digits, so it is held back the same way an unclosed pattern is.
    /// Every occurrence returned here is also returned, unchanged, for any
    /// longer text sharing the prefix.
    pub fn scan_streaming(&self, text: &str) -> Vec<Occurrence> {
        self.scan_with(text, false)
    }

    fn scan_with(&self, text: &str, complete: bool) -> Vec<Occurrence> {
        let mut hits = self.scan_linear_patterns(text);
        let claimed: Vec<(usize, usize)> = hits.iter().map(|h| (h.start, h.end)).collect();

        let mut flat = Vec::new();
        self.collect(&self.linear_speed, text, CommandKind::LinearSpeed, &mut flat, |raw| {
            parse_linear_speed(raw).map(Command::LinearSpeed)
        });
        self.collect(&self.linear, text, CommandKind::Linear, &mut flat, |raw| {
            parse_linear(raw).map(Command::Linear)
        });
        self.collect(&self.vibrate_object, text, CommandKind::VibrateMulti, &mut flat, |raw| {
            parse_pattern(CommandKind::VibrateMulti, raw).map(Command::VibrateMulti)
        });
        self.collect(&self.vibrate_array, text, CommandKind::VibrateArray, &mut flat, |raw| {
            parse_levels(CommandKind::VibrateArray, raw).map(Command::VibrateArray)
        });
        self.collect(&self.vibrate_number, text, CommandKind::VibrateSingle, &mut flat, |raw| {
            parse_intensity(CommandKind::VibrateSingle, raw).map(Command::VibrateSingle)
        });
        self.collect(&self.oscillate_object, text, CommandKind::OscillateMulti, &mut flat, |raw| {
            parse_pattern(CommandKind::OscillateMulti, raw).map(Command::OscillateMulti)
        });
        self.collect(&self.oscillate_number, text, CommandKind::OscillateSingle, &mut flat, |raw| {
            parse_intensity(CommandKind::OscillateSingle, raw).map(Command::OscillateSingle)
        });

        // A pattern owns everything inside its braces.
        flat.retain(|h| !claimed.iter().any(|&(s, e)| h.start >= s && h.start < e));
        if !complete {
            flat.retain(|h| !(is_integer_form(h.kind) && h.end == text.len()));
        }
        hits.extend(flat);

        let offsets = CharOffsets::new(text);
        let mut out: Vec<Occurrence> = hits
            .into_iter()
            .filter_map(|hit| {
                let raw = &text[hit.start..hit.end];
                match hit.parsed {
                    Ok(command) => Some(Occurrence {
                        start: offsets.char_offset(hit.start),
                        len: raw.chars().count(),
                        raw: raw.to_string(),
                        command,
                    }),
                    Err(err) => {
                        log_dropped(hit.kind, &err, raw);
                        None
                    }
                }
            })
            .collect();
        out.sort_by_key(|o| (o.start, o.kind().priority()));
        out
    }

    fn scan_linear_patterns(&self, text: &str) -> Vec<Hit> {
        let mut hits: Vec<Hit> = Vec::new();
        for m in self.linear_pattern.find_iter(text) {
            if hits.iter().any(|h| m.start() >= h.start && m.start() < h.end) {
                continue;
            }
            // The match ends just past the opening brace.
            let open = m.end() - 1;
            let Some(close) = find_closing_brace(text, open) else {
                debug!(offset = m.start(), "LINEAR_PATTERN payload not closed yet");
                continue;
            };
            hits.push(Hit {
                kind: CommandKind::LinearPattern,
                start: m.start(),
                end: close + 1,
                parsed: parse_linear_pattern(&text[open..=close]).map(Command::LinearPattern),
            });
        }
        hits
    }

    fn collect<F>(&self, re: &Regex, text: &str, kind: CommandKind, out: &mut Vec<Hit>, parse: F)
    where
        F: Fn(&str) -> Result<Command>,
    {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(payload)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push(Hit {
                kind,
                start: whole.start(),
                end: whole.end(),
                parsed: parse(payload.as_str()),
            });
        }
    }
}

fn is_integer_form(kind: CommandKind) -> bool {
    matches!(kind, CommandKind::VibrateSingle | CommandKind::OscillateSingle)
}

fn parse_intensity(kind: CommandKind, digits: &str) -> Result<u32> {
    digits.parse::<u32>().map_err(|_| ScanError::InvalidPayload {
        kind,
        reason: "intensity out of range",
    })
}

fn log_dropped(kind: CommandKind, err: &ScanError, raw: &str) {
    match err {
        ScanError::MalformedPayload { .. } => {
            debug!(%kind, %err, raw, "dropping malformed command")
        }
        _ => warn!(%kind, %err, raw, "dropping invalid command"),
    }
}

/// Byte to character offset conversion, free for ASCII text.
struct CharOffsets<'a> {
    text: &'a str,
    ascii: bool,
}

impl<'a> CharOffsets<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            ascii: text.is_ascii(),
        }
    }

    fn char_offset(&self, byte: usize) -> usize {
        if self.ascii {
            byte
        } else {
            self.text[..byte].chars().count()
        }
    }
}

fn shared() -> &'static Scanner {
    static SCANNER: OnceLock<Scanner> = OnceLock::new();
    SCANNER.get_or_init(|| Scanner::new().expect("Invalid command pattern - this is a bug"))
}

/// Scan complete text with the process-wide scanner.
pub fn scan(text: &str) -> Vec<Occurrence> {
    shared().scan(text)
}

/// Scan possibly growing text with the process-wide scanner.
pub fn scan_streaming(text: &str) -> Vec<Occurrence> {
    shared().scan_streaming(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Intervals, LinearSpec, PatternSteps};

    fn kinds(text: &str) -> Vec<CommandKind> {
        scan(text).iter().map(Occurrence::kind).collect()
    }

    #[test]
    fn finds_single_vibrate_at_its_offset() {
        let text = r#"Hello "VIBRATE": 50 world"#;
        let found = scan(text);
        assert_eq!(found.len(), 1);
        let occ = &found[0];
        assert_eq!(occ.command, Command::VibrateSingle(50));
        assert_eq!(occ.start, 6);
        assert_eq!(occ.raw, r#""VIBRATE": 50"#);
        assert_eq!(occ.end(), 19);
    }

    #[test]
    fn every_intensity_in_range_scans_once() {
        for n in 0..=100u32 {
            let text = format!(r#"some text "VIBRATE": {n} more"#);
            let found = scan(&text);
            assert_eq!(found.len(), 1, "input {text}");
            assert_eq!(found[0].command, Command::VibrateSingle(n));
        }
    }

    #[test]
    fn keys_are_case_insensitive_and_quotes_optional() {
        assert_eq!(kinds("vibrate: 10"), vec![CommandKind::VibrateSingle]);
        assert_eq!(kinds(r#""Oscillate": 40"#), vec![CommandKind::OscillateSingle]);
        assert!(kinds("SUPERVIBRATE: 10").is_empty());
    }

    #[test]
    fn recognises_every_documented_form() {
        let text = r#"
            "VIBRATE": 75
            "VIBRATE": [60, 80]
            "VIBRATE": {"pattern": [20,80,20], "interval": [500,500], "loop": 3}
            "OSCILLATE": 40
            "OSCILLATE": {"pattern": [10, 90], "interval": [250]}
            "LINEAR": {"start_position": 10, "end_position": 90, "duration": 1000}
            "LINEAR_SPEED": {"start_position":10,"end_position":90,"start_duration":1500,"end_duration":300,"steps":10}
            "LINEAR_PATTERN": {"segments":[{"start":10,"end":90,"durations":[800,600],"loop":2}], "repeat": true}
        "#;
        assert_eq!(
            kinds(text),
            vec![
                CommandKind::VibrateSingle,
                CommandKind::VibrateArray,
                CommandKind::VibrateMulti,
                CommandKind::OscillateSingle,
                CommandKind::OscillateMulti,
                CommandKind::Linear,
                CommandKind::LinearSpeed,
                CommandKind::LinearPattern,
            ]
        );
    }

    #[test]
    fn parses_multi_vibrate_payload() {
        let found = scan(r#""VIBRATE": {"pattern": [20,80,20], "interval": [500,500], "loop": 3}"#);
        let Command::VibrateMulti(spec) = &found[0].command else {
            panic!("expected a pattern, got {:?}", found[0].command);
        };
        assert_eq!(spec.pattern, PatternSteps::Uniform(vec![20.0, 80.0, 20.0]));
        assert_eq!(spec.interval, Intervals::Sequence(vec![500, 500]));
        assert_eq!(spec.loops, Some(3));
    }

    #[test]
    fn linear_accepts_unquoted_keys() {
        let found = scan("LINEAR: {start_position: 5, end_position: 95, duration: 700}");
        assert_eq!(
            found[0].command,
            Command::Linear(LinearSpec {
                start_position: 5,
                end_position: 95,
                duration: 700
            })
        );
    }

    #[test]
    fn unbalanced_linear_pattern_yields_nothing() {
        let partials = [
            r#""LINEAR_PATTERN": {"#,
            r#""LINEAR_PATTERN": {"segments":[{"start":10,"end":90,"durations":[800,600]"#,
            r#""LINEAR_PATTERN": {"segments":[{"start":10,"end":90,"durations":[800,600]}]"#,
        ];
        for text in partials {
            assert!(scan(text).is_empty(), "input {text}");
        }
    }

    #[test]
    fn linear_pattern_claims_its_span() {
        let text = r#""LINEAR_PATTERN": {"segments":[{"start":0,"end":50,"durations":[300]}], "note": {"VIBRATE": 20}} "VIBRATE": 30"#;
        let found = scan(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind(), CommandKind::LinearPattern);
        assert_eq!(found[1].command, Command::VibrateSingle(30));
    }

    #[test]
    fn malformed_payload_is_dropped_and_scanning_continues() {
        let text = r#""VIBRATE": {"pattern": [20,,80], "interval": 100} then "OSCILLATE": 15"#;
        assert_eq!(kinds(text), vec![CommandKind::OscillateSingle]);
    }

    #[test]
    fn linear_speed_needs_more_than_one_step() {
        let text = r#""LINEAR_SPEED": {"start_position":0,"end_position":100,"start_duration":1000,"end_duration":200,"steps":1}"#;
        assert!(scan(text).is_empty());
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let text = "héllo ✨ VIBRATE: 40";
        let found = scan(text);
        assert_eq!(found[0].start, 8);
        assert_eq!(found[0].len, "VIBRATE: 40".len());
    }

    #[test]
    fn growing_text_keeps_earlier_occurrences_stable() {
        let full = r#"a "VIBRATE": 10 b "LINEAR": {"start_position": 0, "end_position": 100, "duration": 500} c"#;
        let prefix = &full[..40];
        let early = scan(prefix);
        let late = scan(full);
        assert_eq!(early.len(), 1);
        assert_eq!(late.len(), 2);
        assert_eq!(early[0], late[0]);
    }

    #[test]
    fn streaming_holds_back_a_number_at_the_end_of_text() {
        let text = r#"ok "VIBRATE": 8"#;
        assert!(scan_streaming(text).is_empty());
        assert_eq!(scan(text)[0].command, Command::VibrateSingle(8));

        let grown = scan_streaming(r#"ok "VIBRATE": 80 and "OSCILLATE": 3"#);
        assert_eq!(grown.len(), 1);
        assert_eq!(grown[0].command, Command::VibrateSingle(80));
    }

    #[test]
    fn streaming_keeps_closed_forms_at_the_end_of_text() {
        let text = r#"go "VIBRATE": [40, 60]"#;
        assert_eq!(kinds_streaming(text), vec![CommandKind::VibrateArray]);
        assert_eq!(kinds_streaming("vibrate: 12 "), vec![CommandKind::VibrateSingle]);
    }

    fn kinds_streaming(text: &str) -> Vec<CommandKind> {
        scan_streaming(text).iter().map(Occurrence::kind).collect()
    }
}
