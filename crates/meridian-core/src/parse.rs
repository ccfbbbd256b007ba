//! Explicit parsing of free-form model replies.
//!
//! Model replies are never drilled into with chained optional lookups.
//! Every parse produces a [`ParseOutcome`] that says whether parsing
//! succeeded and carries either the parsed value or a deterministic fallback.

use serde::{Deserialize, Serialize};

/// Result of parsing one model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    /// Whether the reply parsed into the expected shape.
    pub ok: bool,
    /// Parsed value, or the fallback object when `ok` is false.
    pub value: serde_json::Value,
    /// The reply exactly as received.
    pub raw_text: String,
}

impl ParseOutcome {
    /// Parse a reply expected to contain a JSON object.
    ///
    /// Markdown code fences are stripped and the outermost `{ ... }` span is
    /// tried when the whole text is not valid JSON. On failure `value` is the
    /// `fallback`.
    pub fn json_object(raw: &str, fallback: serde_json::Value) -> Self {
        match parse_object(raw) {
            Some(value) => Self {
                ok: true,
                value,
                raw_text: raw.to_string(),
            },
            None => Self {
                ok: false,
                value: fallback,
                raw_text: raw.to_string(),
            },
        }
    }

    /// String field of the parsed value.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Numeric field of the parsed value, clamped into `[0, 1]`.
    pub fn unit_field(&self, key: &str) -> Option<f64> {
        let v = self.value.get(key)?;
        let n = v
            .as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;
        Some(crate::clamp_unit(n))
    }
}

fn parse_object(raw: &str) -> Option<serde_json::Value> {
    let trimmed = strip_fences(raw.trim());
    if let Ok(v @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
        Ok(v @ serde_json::Value::Object(_)) => Some(v),
        _ => None,
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// First decimal number in `text` and the text that follows it.
fn first_number(text: &str) -> Option<(f64, &str)> {
    let bytes = text.as_bytes();
    let start = bytes.iter().enumerate().position(|(i, b)| {
        b.is_ascii_digit() || (*b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    })?;
    let len = text[start..]
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len() - start);
    let token = text[start..start + len].trim_end_matches('.');
    let value = token.parse::<f64>().ok()?;
    Some((value, &text[start + token.len()..]))
}

/// Extract a 0–1 score from a judge reply.
///
/// Accepts plain fractions (`0.82`), percentages (`82%`) and `x/10` or
/// `x/100` ratings. Returns `None` when no usable number is present or the
/// number is out of range.
pub fn extract_score(reply: &str) -> Option<f64> {
    let outcome = ParseOutcome::json_object(reply, serde_json::Value::Null);
    if outcome.ok {
        if let Some(score) = outcome.unit_field("score") {
            return Some(score);
        }
    }
    let (value, rest) = first_number(reply)?;
    let rest = rest.trim_start();
    let scaled = if rest.starts_with('%') {
        value / 100.0
    } else if let Some(denominator) = rest.strip_prefix('/') {
        match first_number(denominator) {
            Some((d, _)) if d == 10.0 || d == 100.0 => value / d,
            _ => value,
        }
    } else {
        value
    };
    (0.0..=1.0).contains(&scaled).then_some(scaled)
}
