//! Schema validation of recovered model output into typed facts and results

use crate::types::{
    AlarmLevel, Analysis, BadgeStatus, Decision, DecisionSource, ReasoningResult,
    ResultMetadata, RetrievalCounts, VisionFacts,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Confidence used when the model gives no usable number
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    Invalid { field: &'static str, value: String },
}

fn invalid(field: &'static str, value: &Value) -> ValidationError {
    ValidationError::Invalid {
        field,
        value: value.to_string(),
    }
}

/// Yes/no flags arrive as booleans, numbers or one of several spellings
fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "是" => Some(true),
            "false" | "no" | "n" | "0" | "否" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn optional_flag(
    obj: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<bool, ValidationError> {
    let value = std::iter::once(field)
        .chain(aliases.iter().copied())
        .find_map(|key| obj.get(key));
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(v) => lenient_bool(v).ok_or_else(|| invalid(field, v)),
    }
}

fn text_field(obj: &Map<String, Value>, field: &str) -> String {
    match obj.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Clamp a model-supplied confidence into [0, 1].
///
/// Numbers and numeric strings are clamped; anything else, including NaN,
/// becomes [`DEFAULT_CONFIDENCE`].
pub fn clamp_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

impl VisionFacts {
    /// Validate recovered vision output.
    ///
    /// `has_person` and `badge_status` are required; the hazard flags default
    /// to false.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let has_person = match obj.get("has_person") {
            None | Some(Value::Null) => return Err(ValidationError::Missing("has_person")),
            Some(v) => lenient_bool(v).ok_or_else(|| invalid("has_person", v))?,
        };

        let badge_status = match obj.get("badge_status") {
            None | Some(Value::Null) => return Err(ValidationError::Missing("badge_status")),
            Some(Value::String(s)) => {
                BadgeStatus::parse(s).ok_or_else(|| invalid("badge_status", &obj["badge_status"]))?
            }
            Some(v) => return Err(invalid("badge_status", v)),
        };

        Ok(Self {
            has_person,
            badge_status,
            enters_restricted_area: optional_flag(
                obj,
                "enters_restricted_area",
                &["enter_restricted_area"],
            )?,
            has_fire_or_smoke: optional_flag(obj, "has_fire_or_smoke", &[])?,
            has_electric_risk: optional_flag(obj, "has_electric_risk", &[])?,
            scene_summary: text_field(obj, "scene_summary"),
            object_details: obj.get("object_details").cloned().unwrap_or(Value::Null),
        })
    }
}

impl ReasoningResult {
    /// Validate recovered reasoning output.
    ///
    /// Requires `final_decision` and `analysis`; the decision must carry a
    /// yes/no `is_alarm`, one of the four `alarm_level`s and an
    /// `alarm_reason`. The model's own `metadata.model` and
    /// `metadata.timestamp` are preserved as `original_*`.
    pub fn from_model_output(
        value: &Value,
        model: &str,
        counts: RetrievalCounts,
    ) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let decision = obj
            .get("final_decision")
            .ok_or(ValidationError::Missing("final_decision"))?;
        let decision = decision
            .as_object()
            .ok_or_else(|| invalid("final_decision", decision))?;
        let analysis = obj.get("analysis").ok_or(ValidationError::Missing("analysis"))?;
        let analysis = analysis
            .as_object()
            .ok_or_else(|| invalid("analysis", analysis))?;

        let is_alarm = decision
            .get("is_alarm")
            .ok_or(ValidationError::Missing("is_alarm"))?;
        let is_alarm = match is_alarm {
            Value::Bool(b) => *b,
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "是" => true,
                "no" | "否" => false,
                _ => return Err(invalid("is_alarm", is_alarm)),
            },
            other => return Err(invalid("is_alarm", other)),
        };

        let level = decision
            .get("alarm_level")
            .ok_or(ValidationError::Missing("alarm_level"))?;
        let alarm_level = level
            .as_str()
            .and_then(AlarmLevel::parse)
            .ok_or_else(|| invalid("alarm_level", level))?;

        if !decision.contains_key("alarm_reason") {
            return Err(ValidationError::Missing("alarm_reason"));
        }

        let rules_applied = match analysis.get("rules_applied") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        };

        let mut metadata = ResultMetadata::new(model, DecisionSource::Model, counts);
        if let Some(Value::Object(original)) = obj.get("metadata") {
            metadata.original_model = original
                .get("model")
                .and_then(Value::as_str)
                .filter(|m| *m != model)
                .map(str::to_string);
            metadata.original_timestamp = original
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(Self {
            decision: Decision {
                is_alarm,
                alarm_level,
                reason: text_field(decision, "alarm_reason"),
                confidence: clamp_confidence(decision.get("confidence")),
            },
            analysis: Analysis {
                risk_assessment: text_field(analysis, "risk_assessment"),
                recommendation: text_field(analysis, "recommendation"),
                rules_applied,
            },
            metadata,
        })
    }
}
