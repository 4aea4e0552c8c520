//! The staged recovery pipeline

use crate::lenient;
use crate::metadata::{default_structure, ensure_metadata, UNKNOWN_MODEL};
use crate::passes::{extract_json, REPAIR_PASSES};
use serde_json::Value;
use tracing::debug;

/// How far recovery had to go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Parsed as-is after extraction
    Direct,
    /// Parsed after the repair passes
    Repaired,
    /// Parsed only by the lenient key/value folder
    Lenient,
    /// Nothing parsed; the default structure was returned
    Default,
}

#[derive(Debug, Clone)]
pub struct Recovery {
    pub value: Value,
    pub stage: Stage,
    /// Names of the passes that changed the text
    pub applied: Vec<&'static str>,
}

/// Recover a JSON object from model output. Never fails.
pub fn recover(raw: &str) -> Value {
    recover_with(raw, UNKNOWN_MODEL).value
}

/// Recover, or `None` when no stage yields an object
pub fn try_recover(raw: &str) -> Option<Value> {
    try_recover_with(raw, UNKNOWN_MODEL).map(|r| r.value)
}

/// Like [`recover`], naming the model for any synthesized metadata
pub fn recover_with(raw: &str, model: &str) -> Recovery {
    match attempt(raw, model) {
        Ok(recovery) => recovery,
        Err((reason, applied)) => {
            debug!(%reason, "recovery fell back to the default structure");
            Recovery {
                value: default_structure(&reason, model),
                stage: Stage::Default,
                applied,
            }
        }
    }
}

pub fn try_recover_with(raw: &str, model: &str) -> Option<Recovery> {
    attempt(raw, model).ok()
}

fn attempt(raw: &str, model: &str) -> Result<Recovery, (String, Vec<&'static str>)> {
    let mut applied = Vec::new();

    let (extracted, changed) = extract_json(raw);
    if changed {
        applied.push("extract");
    }

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&extracted) {
        return Ok(Recovery {
            value,
            stage: Stage::Direct,
            applied,
        });
    }

    let mut repaired = extracted.clone();
    for (name, pass) in REPAIR_PASSES {
        let (next, changed) = pass(&repaired);
        if changed {
            applied.push(*name);
            repaired = next;
        }
    }

    let reason = match serde_json::from_str::<Value>(&repaired) {
        Ok(mut value @ Value::Object(_)) => {
            if ensure_metadata(&mut value, &extracted, model) {
                applied.push("ensure_metadata");
            }
            debug!(passes = ?applied, "recovered after repair");
            return Ok(Recovery {
                value,
                stage: Stage::Repaired,
                applied,
            });
        }
        Ok(_) => "top-level value is not an object".to_string(),
        Err(err) => err.to_string(),
    };

    match lenient::parse(&repaired) {
        Some(mut value) => {
            applied.push("lenient_merge");
            if ensure_metadata(&mut value, &extracted, model) {
                applied.push("ensure_metadata");
            }
            debug!(passes = ?applied, "recovered by lenient merge");
            Ok(Recovery {
                value,
                stage: Stage::Lenient,
                applied,
            })
        }
        None => Err((reason, applied)),
    }
}
