//! Individual text passes. Each maps `text -> (text, changed)` and is safe to
//! run on any input.

use crate::arith;
use crate::scan::{
    inside_literal, literal_close, literal_end, next_on_line, next_significant, string_spans,
};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// A single repair pass
pub type Pass = fn(&str) -> (String, bool);

/// Repairs applied, in order, after the direct parse fails
pub const REPAIR_PASSES: &[(&str, Pass)] = &[
    ("trailing_commas", remove_trailing_commas),
    ("broken_strings", repair_broken_strings),
    ("confidence_arithmetic", evaluate_confidence),
    ("normalize_punctuation", normalize_punctuation),
];

static TIMESTAMP_FRAGMENTS_RE: OnceLock<Regex> = OnceLock::new();
static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();
static CONFIDENCE_RE: OnceLock<Regex> = OnceLock::new();

/// Strip code fences, then cut surrounding prose down to the outermost
/// `{...}`. A truncated object keeps everything after its opening brace.
pub fn extract_json(text: &str) -> (String, bool) {
    let mut body = text.trim();

    if let Some(fence) = body.find("```") {
        let after = &body[fence + 3..];
        // Drop the info string (`json`) on the fence line.
        let after = match after.find('\n') {
            Some(nl) => &after[nl + 1..],
            None => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
        body = match after.find("```") {
            Some(close) => &after[..close],
            None => after,
        };
        body = body.trim();
    }

    if let Some(start) = body.find('{') {
        body = match body.rfind('}') {
            Some(end) if end > start => &body[start..=end],
            _ => &body[start..],
        };
    }

    (body.to_string(), body != text)
}

/// Drop commas that directly precede `}` or `]`, outside string literals
pub fn remove_trailing_commas(text: &str) -> (String, bool) {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = literal_end(bytes, i),
            b',' => {
                if let Some((_, b'}' | b']')) = next_significant(bytes, i + 1) {
                    out.push_str(&text[copied..i]);
                    copied = i + 1;
                    changed = true;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    out.push_str(&text[copied..]);
    (out, changed)
}

/// Reassemble timestamps split into quoted fragments, then merge adjacent
/// quoted fragments that sit on the same line.
///
/// `"2024-01-"01T00":"00":00"` becomes `"2024-01-01T00:00:00"` and
/// `"half" "way"` becomes `"halfway"`. A fragment followed by `:` is a key
/// and is never merged into the previous value.
pub fn repair_broken_strings(text: &str) -> (String, bool) {
    let (text, stamps) = reassemble_timestamps(text);
    let (text, merged) = merge_adjacent_fragments(&text);
    (text, stamps || merged)
}

fn reassemble_timestamps(text: &str) -> (String, bool) {
    let fragments = TIMESTAMP_FRAGMENTS_RE
        .get_or_init(|| Regex::new(r#""(\d{4}-\d{2}-[0-9T:.\-"]*)""#).unwrap());
    let timestamp = TIMESTAMP_RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?$").unwrap()
    });

    let mut changed = false;
    let out = fragments.replace_all(text, |caps: &Captures| {
        let inner = &caps[1];
        if !inner.contains('"') {
            return caps[0].to_string();
        }
        let joined: String = inner.chars().filter(|c| *c != '"').collect();
        if timestamp.is_match(&joined) {
            changed = true;
            format!("\"{}\"", joined)
        } else {
            caps[0].to_string()
        }
    });
    (out.into_owned(), changed)
}

fn merge_adjacent_fragments(text: &str) -> (String, bool) {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'"' {
            i += 1;
            continue;
        }
        let Some(mut end) = literal_close(bytes, i) else {
            break;
        };
        // Keep folding while the next thing on the line is another fragment
        // that is not itself a key.
        while let Some((next, b'"')) = next_on_line(bytes, end) {
            let next_end = literal_end(bytes, next);
            if matches!(next_significant(bytes, next_end), Some((_, b':'))) {
                break;
            }
            // Drop the closing quote, the gap and the next opening quote.
            out.push_str(&text[copied..end - 1]);
            copied = next + 1;
            changed = true;
            end = next_end;
            if bytes.get(end - 1) != Some(&b'"') || end - 1 == next {
                break;
            }
        }
        i = end;
    }
    out.push_str(&text[copied..]);
    (out, changed)
}

/// Evaluate arithmetic in the `confidence` field only.
///
/// `a+b=c` takes the right-hand side, other expressions are computed, and
/// the result is written as a bare number rounded to 4 decimals. A plain
/// unquoted number is left alone.
pub fn evaluate_confidence(text: &str) -> (String, bool) {
    let re = CONFIDENCE_RE.get_or_init(|| {
        Regex::new(
            r#"(?P<prefix>"?\bconfidence"?\s*:\s*)(?P<expr>"[^"\n]*"|[0-9.(+\-][0-9.+\-*/()=\s]*)"#,
        )
        .unwrap()
    });

    let spans = string_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut copied = 0;

    for caps in re.captures_iter(text) {
        let (Some(whole), Some(expr)) = (caps.get(0), caps.name("expr")) else {
            continue;
        };
        let quoted_key = text.as_bytes()[whole.start()] == b'"';
        let key_start = whole.start() + usize::from(quoted_key);
        let is_key = if quoted_key {
            let key_end = key_start + "confidence".len() + 1;
            spans.iter().any(|&(s, e)| s == whole.start() && e == key_end)
        } else {
            !inside_literal(&spans, key_start)
        };
        if !is_key {
            continue;
        }

        let raw = expr.as_str();
        let quoted = raw.starts_with('"');
        let body = raw.trim_matches('"');
        let trimmed = body.trim_end();
        let trailing = if quoted { "" } else { &body[trimmed.len()..] };
        let trimmed = trimmed.trim_start();

        if !quoted && trimmed.parse::<f64>().is_ok() {
            continue;
        }
        let target = match trimmed.rfind('=') {
            Some(eq) => trimmed[eq + 1..].trim(),
            None => trimmed,
        };
        let Some(value) = arith::eval(target) else {
            continue;
        };

        out.push_str(&text[copied..expr.start()]);
        out.push_str(&format_rounded(value));
        out.push_str(trailing);
        copied = expr.end();
        changed = true;
    }
    out.push_str(&text[copied..]);
    (out, changed)
}

fn format_rounded(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    format!("{}", rounded)
}

/// Map full-width punctuation outside string literals to ASCII, then turn
/// quoted `"true"`, `"false"` and `"null"` values into bare literals.
pub fn normalize_punctuation(text: &str) -> (String, bool) {
    let (text, widths) = normalize_full_width(text);
    let (text, literals) = unquote_literals(&text);
    (text, widths || literals)
}

fn normalize_full_width(text: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    // Some(true) when the open literal started with a curly quote.
    let mut in_string: Option<bool> = None;
    let mut escaped = false;

    for c in text.chars() {
        match in_string {
            Some(curly) => {
                if escaped {
                    escaped = false;
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(c);
                } else if c == '"' || (curly && c == '”') {
                    in_string = None;
                    changed |= c != '"';
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
            None => {
                let mapped = match c {
                    '"' => {
                        in_string = Some(false);
                        '"'
                    }
                    '“' | '”' => {
                        in_string = Some(true);
                        '"'
                    }
                    '，' => ',',
                    '：' => ':',
                    '；' => ';',
                    '｛' => '{',
                    '｝' => '}',
                    '［' => '[',
                    '］' => ']',
                    '\u{3000}' => ' ',
                    other => other,
                };
                changed |= mapped != c;
                out.push(mapped);
            }
        }
    }
    (out, changed)
}

fn unquote_literals(text: &str) -> (String, bool) {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut copied = 0;

    for (start, end) in string_spans(text) {
        if literal_close(bytes, start) != Some(end) {
            continue;
        }
        let inner = &text[start + 1..end - 1];
        if !matches!(inner, "true" | "false" | "null") {
            continue;
        }
        // Keys stay quoted.
        if matches!(next_significant(bytes, end), Some((_, b':'))) {
            continue;
        }
        out.push_str(&text[copied..start]);
        out.push_str(inner);
        copied = end;
        changed = true;
    }
    out.push_str(&text[copied..]);
    (out, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks!";
        let (out, changed) = extract_json(text);
        assert_eq!(out, "{\"a\": 1}");
        assert!(changed);
    }

    #[test]
    fn test_extract_prose_around_object() {
        let (out, _) = extract_json("Decision follows {\"a\": {\"b\": 2}} end.");
        assert_eq!(out, "{\"a\": {\"b\": 2}}");

        let (out, changed) = extract_json("{\"a\": 1}");
        assert_eq!(out, "{\"a\": 1}");
        assert!(!changed);
    }

    #[test]
    fn test_extract_truncated_object() {
        let (out, _) = extract_json("answer: {\"a\": {\"b\": 1");
        assert_eq!(out, "{\"a\": {\"b\": 1");
    }

    #[test]
    fn test_trailing_commas() {
        let (out, changed) = remove_trailing_commas("{\"a\": [1, 2, ], \"b\": {\"c\": 3,\n},}");
        assert_eq!(out, "{\"a\": [1, 2 ], \"b\": {\"c\": 3\n}}");
        assert!(changed);

        let (out, changed) = remove_trailing_commas("{\"a\": \"x,}\"}");
        assert_eq!(out, "{\"a\": \"x,}\"}");
        assert!(!changed);
    }

    #[test]
    fn test_broken_timestamp() {
        let text = r#"{"timestamp": "2024-01-"01T00":"00":00"}"#;
        let (out, changed) = repair_broken_strings(text);
        assert_eq!(out, r#"{"timestamp": "2024-01-01T00:00:00"}"#);
        assert!(changed);
    }

    #[test]
    fn test_intact_timestamp_untouched() {
        let text = r#"{"timestamp": "2024-01-01T00:00:00", "d": "2024-02-03"}"#;
        let (out, changed) = repair_broken_strings(text);
        assert_eq!(out, text);
        assert!(!changed);
    }

    #[test]
    fn test_merge_fragments_on_one_line() {
        let (out, changed) = repair_broken_strings(r#"{"reason": "badge " "missing"}"#);
        assert_eq!(out, r#"{"reason": "badge missing"}"#);
        assert!(changed);

        let (out, _) = repair_broken_strings(r#"{"r": "a" "b" "c"}"#);
        assert_eq!(out, r#"{"r": "abc"}"#);
    }

    #[test]
    fn test_no_merge_into_following_key() {
        let text = "{\"a\": \"x\" \"b\": 1}";
        let (out, changed) = repair_broken_strings(text);
        assert_eq!(out, text);
        assert!(!changed);

        let multiline = "{\"a\": \"x\"\n\"b\"}";
        assert!(!repair_broken_strings(multiline).1);
    }

    #[test]
    fn test_confidence_equation_takes_rhs() {
        let (out, changed) = evaluate_confidence(r#"{confidence: "0.8728 + 0.8705 = 1.7433"}"#);
        assert_eq!(out, "{confidence: 1.7433}");
        assert!(changed);
    }

    #[test]
    fn test_confidence_expression_evaluated() {
        let (out, _) = evaluate_confidence("{\"confidence\": 0.4 + 0.35,\n\"x\": 1}");
        assert_eq!(out, "{\"confidence\": 0.75,\n\"x\": 1}");

        let (out, _) = evaluate_confidence("{\"confidence\": (0.9 + 0.8) / 2 }");
        assert_eq!(out, "{\"confidence\": 0.85 }");
    }

    #[test]
    fn test_confidence_only() {
        let text = r#"{"score": 0.4 + 0.4, "reason": "confidence: 1+1", "confidence": 0.9}"#;
        let (out, changed) = evaluate_confidence(text);
        assert_eq!(out, text);
        assert!(!changed);

        let (out, changed) = evaluate_confidence(r#"{"confidence": "high"}"#);
        assert_eq!(out, r#"{"confidence": "high"}"#);
        assert!(!changed);
    }

    #[test]
    fn test_full_width_outside_strings() {
        let text = "{\"reason\"：\"人员，未佩戴\"，\"ok\"：“yes”}";
        let (out, changed) = normalize_punctuation(text);
        assert_eq!(out, "{\"reason\":\"人员，未佩戴\",\"ok\":\"yes\"}");
        assert!(changed);
    }

    #[test]
    fn test_unquote_literals() {
        let (out, changed) = normalize_punctuation(r#"{"a": "true", "b": "null", "true": "false"}"#);
        assert_eq!(out, r#"{"a": true, "b": null, "true": false}"#);
        assert!(changed);

        let (out, changed) = normalize_punctuation(r#"{"a": "truth"}"#);
        assert_eq!(out, r#"{"a": "truth"}"#);
        assert!(!changed);
    }

    #[test]
    fn test_passes_are_total() {
        let nasty = ["", "\"", "{", "}}}", "\"\\", "，：“", "confidence: ((((", "```", "\u{1F600}{\""];
        for input in nasty {
            for (_, pass) in REPAIR_PASSES {
                let _ = pass(input);
            }
            let _ = extract_json(input);
        }
    }
}
