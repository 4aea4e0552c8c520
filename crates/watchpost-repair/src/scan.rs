//! String-literal awareness shared by the text passes

/// Byte ranges of double-quoted literals, quotes included. An unterminated
/// literal runs to the end of the text.
pub(crate) fn string_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            let end = literal_end(bytes, i);
            spans.push((i, end));
            i = end;
        } else {
            i += 1;
        }
    }
    spans
}

/// Index just past the literal opening at `start`
pub(crate) fn literal_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Like [`literal_end`], but `None` when the literal never closes
pub(crate) fn literal_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// True when `pos` falls strictly inside a literal (not on its opening quote)
pub(crate) fn inside_literal(spans: &[(usize, usize)], pos: usize) -> bool {
    spans
        .iter()
        .any(|&(start, end)| pos > start && pos < end)
}

/// First non-blank byte at or after `from`, skipping spaces and tabs only
pub(crate) fn next_on_line(bytes: &[u8], from: usize) -> Option<(usize, u8)> {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|b| *b != b' ' && *b != b'\t')
        .map(|offset| (from + offset, bytes[from + offset]))
}

/// First non-whitespace byte at or after `from`
pub(crate) fn next_significant(bytes: &[u8], from: usize) -> Option<(usize, u8)> {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|offset| (from + offset, bytes[from + offset]))
}

/// The balanced `{...}` starting at `open`, string-aware. Returns `None` if
/// the object never closes.
pub(crate) fn balanced_object(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = literal_end(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[open..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_respect_escapes() {
        let text = r#"{"a": "x\"y", "b": 1}"#;
        let spans = string_spans(text);
        let literals: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(literals, vec![r#""a""#, r#""x\"y""#, r#""b""#]);
        assert!(inside_literal(&spans, 3));
        assert!(!inside_literal(&spans, 1));
    }

    #[test]
    fn test_unterminated_span_runs_to_end() {
        let text = r#"{"a": "open"#;
        let spans = string_spans(text);
        assert_eq!(spans.last(), Some(&(6, text.len())));
    }

    #[test]
    fn test_literal_close() {
        assert_eq!(literal_close(br#""ab" x"#, 0), Some(4));
        assert_eq!(literal_close(br#""ab\""#, 0), None);
    }

    #[test]
    fn test_balanced_object_skips_braces_in_strings() {
        let text = r#"x {"a": "}", "b": {"c": 1}} tail"#;
        assert_eq!(
            balanced_object(text, 2),
            Some(r#"{"a": "}", "b": {"c": 1}}"#)
        );
        assert_eq!(balanced_object("{\"a\": 1", 0), None);
    }
}
