//! Bounded textual repairs for model output.
//!
//! Each function is pure: the same input always yields the same output, so
//! applying a repair twice is the same as applying it once.

use std::fmt;

/// A repair the parser applied on the way to a valid structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Prose or code fences around the JSON object were removed.
    StrippedWrapping,
    RemovedTrailingCommas,
    /// Numeric strings on integer fields became numbers (concrete paths).
    CoercedNumbers(Vec<String>),
    /// Non-essential fields filled from the request or computed.
    SynthesizedFields(Vec<String>),
    /// An invalid optional project was removed (module path).
    DroppedInvalidProject(String),
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrippedWrapping => f.write_str("stripped text around the JSON object"),
            Self::RemovedTrailingCommas => f.write_str("removed trailing commas"),
            Self::CoercedNumbers(paths) => {
                write!(f, "coerced numeric strings at {}", paths.join(", "))
            }
            Self::SynthesizedFields(fields) => {
                write!(f, "filled in {}", fields.join(", "))
            }
            Self::DroppedInvalidProject(path) => write!(f, "dropped invalid {path}"),
        }
    }
}

/// Every balanced top-level `{...}` span in `text`, in order of appearance.
///
/// Braces inside JSON strings are ignored. An object that never closes is
/// returned up to the end of the text, so the decoder can report why.
pub fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(begin) = start.take() {
                        spans.push(&text[begin..=idx]);
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        spans.push(&text[begin..]);
    }
    spans
}

/// Drop commas that directly precede `}` or `]` (outside strings).
///
/// Returns `None` when there was nothing to remove.
pub fn remove_trailing_commas(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut removed = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    removed = true;
                } else {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    removed.then_some(out)
}
