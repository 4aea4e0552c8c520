//! `metadata` block recovery and the canonical default structure

use crate::lenient;
use crate::passes::remove_trailing_commas;
use crate::scan::balanced_object;
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Model label used when the caller does not name one
pub const UNKNOWN_MODEL: &str = "unknown";

static METADATA_KEY_RE: OnceLock<Regex> = OnceLock::new();

/// Synthesized `{model, timestamp}` block
pub fn default_metadata(model: &str) -> Value {
    json!({
        "model": model,
        "timestamp": Utc::now().to_rfc3339(),
        "note": "metadata synthesized during recovery",
    })
}

/// The no-alarm structure returned when nothing in the text parses
pub fn default_structure(reason: &str, model: &str) -> Value {
    json!({
        "final_decision": {
            "is_alarm": "no",
            "alarm_level": "none",
            "alarm_reason": format!("model output could not be parsed: {}", reason),
            "confidence": 0.0,
        },
        "analysis": {
            "risk_assessment": "unparseable model output",
            "recommendation": "check the model output format",
            "rules_applied": ["error handling"],
        },
        "metadata": default_metadata(model),
    })
}

/// Pull the last `"metadata": {...}` block out of `text`
pub(crate) fn extract_metadata(text: &str) -> Option<Value> {
    let re = METADATA_KEY_RE.get_or_init(|| Regex::new(r#""metadata"\s*:\s*\{"#).unwrap());
    let found = re.find_iter(text).last()?;
    let open = found.end() - 1;
    let block = balanced_object(text, open).unwrap_or(&text[open..]);

    let (cleaned, _) = remove_trailing_commas(block);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => lenient::parse(&cleaned),
    }
}

/// Make sure an object result carries `metadata`, recovering it from
/// `source` when possible. Returns whether anything was added.
pub(crate) fn ensure_metadata(value: &mut Value, source: &str, model: &str) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    if map.contains_key("metadata") {
        return false;
    }
    let metadata = extract_metadata(source).unwrap_or_else(|| default_metadata(model));
    map.insert("metadata".to_string(), metadata);
    true
}
